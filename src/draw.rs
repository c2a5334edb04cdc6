//! Drawing profiles into pixel grids.

use log::debug;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::profile::Profile;
use crate::source::SourceCatalog;
use crate::wcs::Wcs;
use crate::{Jacobian, Moments, Result, Vec2D};

/// whether the draw convolves by the pixel response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum DrawMethod {
    /// integrate over the pixel
    Auto,
    /// sample the profile; used when the PSF already includes the pixel
    NoPixel,
}

pub trait DrawKernel: Send + Sync {
    /// add `profile`, centered at image position `pos`, into `image`
    fn draw(
        &self,
        profile: &Profile,
        pos: Vec2D,
        jacobian: &Jacobian,
        method: DrawMethod,
        image: &mut Array2<f64>,
    );
}

/// Draws every profile as the Gaussian with the same flux and second
/// moments. The stamp extends `nsigma` times the widest axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentKernel {
    pub nsigma: f64,
}

impl Default for MomentKernel {
    fn default() -> Self {
        Self { nsigma: 5.0 }
    }
}

/// sky moments to pixel moments through the inverse jacobian
fn pixel_moments(sky: &Moments, jacobian: &Jacobian) -> Option<Moments> {
    let det = jacobian.det();
    if det.abs() < 1e-30 {
        return None;
    }
    let inv = [
        [jacobian.dvdrow / det, -jacobian.dudrow / det],
        [-jacobian.dvdcol / det, jacobian.dudcol / det],
    ];
    // rows of `inv` map (u, v) to (col, row)
    Some(sky.transform(inv))
}

impl DrawKernel for MomentKernel {
    fn draw(
        &self,
        profile: &Profile,
        pos: Vec2D,
        jacobian: &Jacobian,
        method: DrawMethod,
        image: &mut Array2<f64>,
    ) {
        let flux = profile.flux();
        let Some(mut cov) = pixel_moments(&profile.second_moments(), jacobian) else {
            return;
        };
        if method == DrawMethod::Auto {
            cov.xx += 1.0 / 12.0;
            cov.yy += 1.0 / 12.0;
        }
        let det = cov.det();
        if det <= 0.0 || flux == 0.0 {
            return;
        }
        let norm = flux / (2.0 * std::f64::consts::PI * det.sqrt());
        let (ixx, ixy, iyy) = (cov.yy / det, -cov.xy / det, cov.xx / det);

        // FITS positions are one-based
        let (xc, yc) = (pos.x - 1.0, pos.y - 1.0);
        let half = self.nsigma * cov.xx.max(cov.yy).sqrt();
        let (nrow, ncol) = image.dim();
        let col_lo = (xc - half).floor().max(0.0) as usize;
        let row_lo = (yc - half).floor().max(0.0) as usize;
        let col_hi = ((xc + half).ceil() + 1.0).clamp(0.0, ncol as f64) as usize;
        let row_hi = ((yc + half).ceil() + 1.0).clamp(0.0, nrow as f64) as usize;
        for row in row_lo..row_hi {
            let dy = row as f64 - yc;
            for col in col_lo..col_hi {
                let dx = col as f64 - xc;
                let chi2 = ixx * dx * dx + 2.0 * ixy * dx * dy + iyy * dy * dy;
                image[[row, col]] += norm * (-0.5 * chi2).exp();
            }
        }
    }
}

/// render every source in `src_inds` into a fresh `image_shape` image
pub fn render_sources_for_image(
    image_shape: [usize; 2],
    wcs: &dyn Wcs,
    draw_method: DrawMethod,
    src_inds: &[usize],
    src_func: &dyn SourceCatalog,
    kernel: &dyn DrawKernel,
) -> Result<Array2<f64>> {
    let mut image = Array2::zeros((image_shape[0], image_shape[1]));
    for &ind in src_inds {
        let (profile, pos) = src_func.source_for(ind)?;
        let jacobian = wcs.local_jacobian(pos);
        kernel.draw(&profile, pos, &jacobian, draw_method, &mut image);
    }
    debug!(" rendered {} sources", src_inds.len());
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn flux_is_conserved_inside_the_image() {
        let mut image = Array2::zeros((64, 64));
        let jac = Jacobian::from_scale(0.263, 31.5, 31.5);
        let prof = Profile::Gaussian { sigma: 0.5, flux: 100.0 };
        MomentKernel::default().draw(&prof, Vec2D::new(32.5, 32.5), &jac, DrawMethod::Auto, &mut image);
        assert_relative_eq!(image.sum(), 100.0, epsilon = 1e-3);
        let peak = image.iter().cloned().fold(f64::MIN, f64::max);
        // the center falls between four pixels
        assert_relative_eq!(image[[31, 31]], peak, epsilon = 1e-12);
        assert_relative_eq!(image[[32, 32]], peak, epsilon = 1e-12);
    }

    #[test]
    fn off_image_sources_are_clipped() {
        let mut image = Array2::zeros((16, 16));
        let jac = Jacobian::from_scale(0.263, 0.0, 0.0);
        let prof = Profile::Gaussian { sigma: 0.3, flux: 1.0 };
        MomentKernel::default().draw(&prof, Vec2D::new(-500.0, 8.0), &jac, DrawMethod::NoPixel, &mut image);
        assert_eq!(image.sum(), 0.0);
        MomentKernel::default().draw(&prof, Vec2D::new(1.0, 1.0), &jac, DrawMethod::NoPixel, &mut image);
        assert!(image[[0, 0]] > 0.0);
        assert!(image.sum() < 1.0);
    }

    #[test]
    fn pixel_response_widens_the_draw() {
        let jac = Jacobian::from_scale(1.0, 0.0, 0.0);
        let prof = Profile::Gaussian { sigma: 0.6, flux: 1.0 };
        let mut auto = Array2::zeros((21, 21));
        let mut nopix = Array2::zeros((21, 21));
        let pos = Vec2D::new(11.0, 11.0);
        MomentKernel::default().draw(&prof, pos, &jac, DrawMethod::Auto, &mut auto);
        MomentKernel::default().draw(&prof, pos, &jac, DrawMethod::NoPixel, &mut nopix);
        assert!(auto[[10, 10]] < nopix[[10, 10]]);
    }
}
