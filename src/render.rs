//! Rendering one single-epoch image: pick the objects that land on it, draw
//! them, add background and noise, and write the planes back.

use std::path::{Path, PathBuf};

use log::{debug, info};
use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::band_info::SeInfo;
use crate::draw::{render_sources_for_image, DrawKernel, DrawMethod};
use crate::files::{expand_path, output_path_for};
use crate::io::{read_mask, read_plane, resolve_ext, write_planes_in_place};
use crate::sky_bounds::get_rough_sky_bounds;
use crate::source::SourceCatalog;
use crate::stats::median;
use crate::staging::StagedOutFile;
use crate::truth::TruthRecord;
use crate::wcs::Wcs;
use crate::{Result, SimError};

/// objects within 128 coadd pixels of an image edge are drawn on it, arcsec
pub const BOUNDS_BUFFER_UV: f64 = 128.0 * 0.263;
const SKY_BOUNDS_N_GRID: usize = 4;

/// everything needed to render one single-epoch image
pub struct RenderJob<'a> {
    pub se_info: &'a SeInfo,
    pub band: &'a str,
    pub truth: &'a [TruthRecord],
    pub wcs: &'a dyn Wcs,
    pub src_func: &'a dyn SourceCatalog,
    pub kernel: &'a dyn DrawKernel,
    pub draw_method: DrawMethod,
    pub bounds_buffer_uv: f64,
    pub noise_seed: u64,
    /// keep the real bad pixel mask, or write an empty one
    pub mask: bool,
    pub output_meds_dir: &'a Path,
    /// inputs under this directory are written under `output_meds_dir`
    pub tmp_dir: Option<&'a Path>,
}

/// the four planes written back for one image
#[derive(Debug, Clone, PartialEq)]
pub struct SePlanes {
    pub image: Array2<f64>,
    pub weight: Array2<f64>,
    pub background: Array2<f64>,
    pub bmask: Array2<i32>,
}

/// indices of the truth objects that fall on the image or within the buffer
pub fn cut_truth_cat_to_se_image(
    truth: &[TruthRecord],
    se_info: &SeInfo,
    wcs: &dyn Wcs,
    bounds_buffer_uv: f64,
) -> Vec<usize> {
    let (bounds, center) = get_rough_sky_bounds(
        se_info.image_shape,
        wcs,
        se_info.position_offset,
        bounds_buffer_uv,
        SKY_BOUNDS_N_GRID,
    );
    truth
        .iter()
        .enumerate()
        .filter(|(_, rec)| bounds.contains_sky(rec.sky(), center))
        .map(|(i, _)| i)
        .collect()
}

pub fn render_all_objects(
    msk_inds: &[usize],
    se_info: &SeInfo,
    wcs: &dyn Wcs,
    src_func: &dyn SourceCatalog,
    draw_method: DrawMethod,
    kernel: &dyn DrawKernel,
) -> Result<Array2<f64>> {
    render_sources_for_image(se_info.image_shape, wcs, draw_method, msk_inds, src_func, kernel)
}

fn check_shape(what: &str, found: (usize, usize), want: (usize, usize)) -> Result<()> {
    if found != want {
        return Err(SimError::Shape(format!(
            "{} is {:?}, image is {:?}",
            what, found, want
        )));
    }
    Ok(())
}

/// Back to ADU, add the background and noise at the level of the real
/// weight map, and apply the mask toggle. The weight plane becomes the
/// uniform inverse variance of the added noise.
pub fn add_noise_mask_background_planes(
    mut image: Array2<f64>,
    background: Array2<f64>,
    weight: Array2<f64>,
    bmask: Array2<i32>,
    scale: f64,
    noise_seed: u64,
    mask: bool,
) -> Result<SePlanes> {
    check_shape("background", background.dim(), image.dim())?;
    check_shape("weight", weight.dim(), image.dim())?;
    check_shape("bmask", bmask.dim(), image.dim())?;

    image.mapv_inplace(|v| v / scale);
    image += &background;

    let good_wgt = median(
        weight
            .iter()
            .zip(bmask.iter())
            .filter(|(_, m)| **m == 0)
            .map(|(w, _)| *w),
    );
    let img_std = match good_wgt {
        Some(w) if w > 0.0 => 1.0 / w.sqrt(),
        _ => {
            return Err(SimError::InvalidFITS(
                "no positive weight among unmasked pixels".to_string(),
            ))
        }
    };

    let mut rng = ChaCha8Rng::seed_from_u64(noise_seed);
    image.mapv_inplace(|v| {
        let n: f64 = StandardNormal.sample(&mut rng);
        v + n * img_std
    });
    let weight = Array2::from_elem(image.dim(), 1.0 / (img_std * img_std));

    let bmask = if mask {
        bmask
    } else {
        Array2::zeros(bmask.dim())
    };
    Ok(SePlanes {
        image,
        weight,
        background,
        bmask,
    })
}

/// read the background, weight and mask of `se_info` and finish the image
pub fn add_noise_mask_background(
    image: Array2<f64>,
    se_info: &SeInfo,
    noise_seed: u64,
    mask: bool,
) -> Result<SePlanes> {
    let bkg_file = se_info.bkg_file();
    let background = read_plane(&bkg_file, resolve_ext(&bkg_file, &se_info.bkg_ext)?)?;
    let wgt_file = expand_path(&se_info.weight_path);
    let weight = read_plane(&wgt_file, resolve_ext(&wgt_file, &se_info.weight_ext)?)?;
    let msk_file = expand_path(&se_info.bmask_path);
    let bmask = read_mask(&msk_file, resolve_ext(&msk_file, &se_info.bmask_ext)?)?;
    add_noise_mask_background_planes(
        image,
        background,
        weight,
        bmask,
        se_info.scale,
        noise_seed,
        mask,
    )
}

/// copy `source` into a staging area next to `dest` and patch the listed HDUs
fn stage_with_planes(
    source: &Path,
    dest: &Path,
    planes: &[(usize, &Array2<f64>)],
) -> Result<StagedOutFile> {
    let staged = StagedOutFile::new(dest)?;
    std::fs::copy(source, staged.path())?;
    write_planes_in_place(staged.path(), planes)?;
    Ok(staged)
}

/// Write image, weight and mask into (a copy of) the image file and the
/// background into (a copy of) the background file. Returns the two
/// destinations. Both copies are complete before either is moved into
/// place, so a bad extension leaves no output behind.
pub fn write_se_img_wgt_bkg(
    planes: &SePlanes,
    se_info: &SeInfo,
    output_meds_dir: &Path,
    tmp_dir: Option<&Path>,
) -> Result<(PathBuf, PathBuf)> {
    se_info.check_layout()?;

    let image_src = se_info.image_file();
    let bkg_src = se_info.bkg_file();
    let image_exts = [
        resolve_ext(&image_src, &se_info.image_ext)?,
        resolve_ext(&image_src, &se_info.weight_ext)?,
        resolve_ext(&image_src, &se_info.bmask_ext)?,
    ];
    let bkg_ext = resolve_ext(&bkg_src, &se_info.bkg_ext)?;

    let bmask = planes.bmask.mapv(f64::from);
    let image_staged = stage_with_planes(
        &image_src,
        &output_path_for(&image_src, tmp_dir, output_meds_dir),
        &[
            (image_exts[0], &planes.image),
            (image_exts[1], &planes.weight),
            (image_exts[2], &bmask),
        ],
    )?;
    let bkg_staged = stage_with_planes(
        &bkg_src,
        &output_path_for(&bkg_src, tmp_dir, output_meds_dir),
        &[(bkg_ext, &planes.background)],
    )?;
    Ok((image_staged.commit()?, bkg_staged.commit()?))
}

/// select, draw, add noise and write one single-epoch image
pub fn render_se_image(job: &RenderJob) -> Result<(PathBuf, PathBuf)> {
    let msk_inds = cut_truth_cat_to_se_image(job.truth, job.se_info, job.wcs, job.bounds_buffer_uv);
    debug!(
        " {} objects on {} ({} band)",
        msk_inds.len(),
        job.se_info.image_path,
        job.band
    );

    let image = render_all_objects(
        &msk_inds,
        job.se_info,
        job.wcs,
        job.src_func,
        job.draw_method,
        job.kernel,
    )?;
    let planes = add_noise_mask_background(image, job.se_info, job.noise_seed, job.mask)?;
    let written = write_se_img_wgt_bkg(&planes, job.se_info, job.output_meds_dir, job.tmp_dir)?;
    info!(" wrote {}", written.0.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn planes(mask: bool) -> SePlanes {
        let image = Array2::zeros((20, 30));
        let background = Array2::from_elem((20, 30), 10.0);
        let mut weight = Array2::from_elem((20, 30), 4.0);
        let mut bmask = Array2::zeros((20, 30));
        // masked pixels with junk weights are ignored by the noise level
        for col in 0..30 {
            bmask[[0, col]] = 1 << 3;
            weight[[0, col]] = 1e-6;
        }
        add_noise_mask_background_planes(image, background, weight, bmask, 2.0, 7, mask).unwrap()
    }

    #[test]
    fn weight_is_the_inverse_noise_variance() {
        let out = planes(true);
        assert!(out.weight.iter().all(|w| (*w - 4.0).abs() < 1e-12));
        let mean = out.image.mean().unwrap();
        assert_relative_eq!(mean, 10.0, epsilon = 0.15);
        assert_eq!(out.bmask[[0, 3]], 8);
    }

    #[test]
    fn noise_is_seeded() {
        assert_eq!(planes(true).image, planes(true).image);
    }

    #[test]
    fn masking_off_clears_the_mask() {
        let out = planes(false);
        assert!(out.bmask.iter().all(|m| *m == 0));
        // the noise does not depend on the toggle
        assert_eq!(out.image, planes(true).image);
    }

    #[test]
    fn image_is_converted_to_adu() {
        let image = Array2::from_elem((4, 4), 100.0);
        let out = add_noise_mask_background_planes(
            image,
            Array2::zeros((4, 4)),
            Array2::from_elem((4, 4), 1e12),
            Array2::zeros((4, 4)),
            4.0,
            1,
            true,
        )
        .unwrap();
        assert!(out.image.iter().all(|v| (*v - 25.0).abs() < 1e-3));
    }

    #[test]
    fn all_masked_weight_is_an_error() {
        let res = add_noise_mask_background_planes(
            Array2::zeros((2, 2)),
            Array2::zeros((2, 2)),
            Array2::from_elem((2, 2), 1.0),
            Array2::from_elem((2, 2), 1),
            1.0,
            1,
            true,
        );
        assert!(res.is_err());
        let res = add_noise_mask_background_planes(
            Array2::zeros((2, 2)),
            Array2::zeros((3, 2)),
            Array2::from_elem((2, 2), 1.0),
            Array2::zeros((2, 2)),
            1.0,
            1,
            true,
        );
        assert!(matches!(res, Err(SimError::Shape(_))));
    }
}
