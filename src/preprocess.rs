//! Per-object cleanup of multi-band, multi-epoch cutouts before fitting.
//!
//! The structural steps (dropping the coadd, zero-flux epochs and epochs that
//! cannot be interpolated) build new band lists; only the pixel-scale step
//! edits pixel values in place.

use log::debug;
use ndarray::Array2;
use rand::Rng;

use crate::interpolate::interpolate_image_at_mask;
use crate::observation::{MultiBandObs, ObsList, Observation};
use crate::stats::median;
use crate::Jacobian;

/// FWHM of the fixed aperture used to judge masked-pixel coverage, arcsec
pub const APERTURE_FWHM: f64 = 1.2;
/// epochs whose aperture-weighted good-pixel fraction falls below this are dropped
pub const MIN_GOOD_FRAC: f64 = 0.9;
pub const INTERP_MAXFRAC: f64 = 0.9;
pub const INTERP_BUFF: usize = 4;

const FWHM_TO_SIGMA: f64 = 2.354_820_045_030_949_3;

/// run every step: strip coadd, strip zero flux, fill masked pixels, rescale
pub fn preprocess<R: Rng + ?Sized>(mbobs: MultiBandObs, rng: &mut R) -> MultiBandObs {
    let mbobs = strip_coadd(&mbobs);
    let mbobs = strip_zero_flux(&mbobs);
    let mut mbobs = fill_empty_pix(&mbobs, rng);
    apply_pixel_scale(&mut mbobs);
    mbobs
}

fn filter_epochs<F>(mbobs: &MultiBandObs, mut keep: F) -> MultiBandObs
where
    F: FnMut(usize, &Observation) -> Option<Observation>,
{
    let mut out = mbobs.like();
    for ol in &mbobs.bands {
        let mut new_ol = ol.like();
        new_ol.obs = ol
            .obs
            .iter()
            .enumerate()
            .filter_map(|(i, obs)| keep(i, obs))
            .collect();
        out.bands.push(new_ol);
    }
    out
}

/// drop epoch 0 of every band; the coadd is never fit
pub fn strip_coadd(mbobs: &MultiBandObs) -> MultiBandObs {
    filter_epochs(mbobs, |i, obs| (i > 0).then(|| obs.clone()))
}

/// drop epochs whose image sums to zero or less
pub fn strip_zero_flux(mbobs: &MultiBandObs) -> MultiBandObs {
    filter_epochs(mbobs, |_, obs| (obs.image.sum() > 0.0).then(|| obs.clone()))
}

/// Gaussian aperture of `fwhm` arcsec drawn at the true center of a
/// `shape` cutout through the cutout's jacobian
pub fn aperture_weights(jacobian: &Jacobian, shape: (usize, usize), fwhm: f64) -> Array2<f64> {
    let sigma = fwhm / FWHM_TO_SIGMA;
    let centered = jacobian.with_center(
        (shape.0 as f64 - 1.0) / 2.0,
        (shape.1 as f64 - 1.0) / 2.0,
    );
    Array2::from_shape_fn(shape, |(row, col)| {
        let uv = centered.get_uv(row as f64, col as f64);
        (-0.5 * uv.dot(&uv) / (sigma * sigma)).exp()
    })
}

/// aperture-weighted fraction of unmasked pixels
pub fn good_fraction(bad: &Array2<bool>, weights: &Array2<f64>) -> f64 {
    let total: f64 = weights.sum();
    if total <= 0.0 {
        return 0.0;
    }
    let good: f64 = bad
        .iter()
        .zip(weights.iter())
        .filter(|(bad, _)| !**bad)
        .map(|(_, w)| *w)
        .sum();
    good / total
}

pub fn passes_aperture_cut(good_frac: f64) -> bool {
    good_frac >= MIN_GOOD_FRAC
}

fn fill_one<R: Rng + ?Sized>(obs: &Observation, rng: &mut R) -> Option<Observation> {
    let bad = obs.bad_pixels();
    let wgt = median(obs.weight.iter().copied()).unwrap_or(0.0);

    let apwgt = aperture_weights(&obs.jacobian, obs.dim(), APERTURE_FWHM);
    let good_frac = good_fraction(&bad, &apwgt);
    if !passes_aperture_cut(good_frac) {
        debug!(" dropping epoch: aperture good fraction {:.3}", good_frac);
        return None;
    }

    let image = interpolate_image_at_mask(
        &obs.image, wgt, &bad, rng, INTERP_MAXFRAC, INTERP_BUFF, true,
    );
    let noise = interpolate_image_at_mask(
        &obs.noise, wgt, &bad, rng, INTERP_MAXFRAC, INTERP_BUFF, true,
    );
    match (image, noise) {
        (Some(image), Some(noise)) => Some(Observation {
            image,
            noise,
            ..obs.clone()
        }),
        _ => {
            debug!(" dropping epoch: masked pixels could not be interpolated");
            None
        }
    }
}

/// interpolate masked pixels of every epoch, dropping epochs with too little
/// usable signal in the central aperture or that cannot be interpolated
pub fn fill_empty_pix<R: Rng + ?Sized>(mbobs: &MultiBandObs, rng: &mut R) -> MultiBandObs {
    filter_epochs(mbobs, |_, obs| fill_one(obs, rng))
}

/// image /= s^2 and weight *= s^4, so one unit of area is one scaled pixel
pub fn scale_observation(obs: &mut Observation, scale: f64) {
    let scale2 = scale * scale;
    let scale4 = scale2 * scale2;
    obs.image.mapv_inplace(|v| v / scale2);
    obs.weight.mapv_inplace(|v| v * scale4);
}

pub fn apply_pixel_scale(mbobs: &mut MultiBandObs) {
    for ol in mbobs.bands.iter_mut() {
        for obs in ol.obs.iter_mut() {
            let scale = obs.jacobian.get_scale();
            scale_observation(obs, scale);
        }
    }
}

/// every band has at least one epoch left
pub fn all_bands_have_images(mbobs: &MultiBandObs) -> bool {
    !mbobs.bands.is_empty() && mbobs.bands.iter().all(|ol: &ObsList| !ol.is_empty())
}
