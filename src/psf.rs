//! PSF models evaluated at an image position.

use std::sync::Arc;

use crate::band_info::SeInfo;
use crate::config::{PixPsfParams, PsfConfig};
use crate::profile::Profile;
use crate::wcs::Wcs;
use crate::{Result, SimError, Shear, Vec2D};

/// FWHM of the default round Gaussian PSF, arcsec
pub const GAUSS_PSF_FWHM: f64 = 0.9;

pub trait PsfModel: Send + Sync {
    /// the PSF at `image_pos` in sky coordinates, unit flux
    fn psf_at(&self, image_pos: Vec2D) -> Profile;
}

/// a Gaussian PSF, constant over the image
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianPsf {
    pub fwhm: f64,
    pub shear: Shear,
}

impl GaussianPsf {
    pub fn round(fwhm: f64) -> Self {
        Self {
            fwhm,
            shear: Shear::new(0.0, 0.0),
        }
    }
}

impl From<&PixPsfParams> for GaussianPsf {
    fn from(params: &PixPsfParams) -> Self {
        Self {
            fwhm: params.fwhm,
            shear: Shear::new(params.g1, params.g2),
        }
    }
}

impl PsfModel for GaussianPsf {
    fn psf_at(&self, _image_pos: Vec2D) -> Profile {
        let psf = Profile::gaussian_fwhm(self.fwhm);
        if self.shear.g() > 0.0 {
            psf.shear(self.shear)
        } else {
            psf
        }
    }
}

/// Gaussian core plus a broader Gaussian wing carrying a fixed share of the
/// flux.
#[derive(Debug, Clone, PartialEq)]
pub struct NonGaussianPsf {
    pub core: GaussianPsf,
    pub wing_fwhm_ratio: f64,
    pub wing_flux: f64,
}

impl From<&PixPsfParams> for NonGaussianPsf {
    fn from(params: &PixPsfParams) -> Self {
        Self {
            core: params.into(),
            wing_fwhm_ratio: 2.0,
            wing_flux: 0.2,
        }
    }
}

impl PsfModel for NonGaussianPsf {
    fn psf_at(&self, image_pos: Vec2D) -> Profile {
        let core = self.core.psf_at(image_pos).with_flux(1.0 - self.wing_flux);
        let wing = Profile::gaussian_fwhm(self.core.fwhm * self.wing_fwhm_ratio)
            .shear(self.core.shear)
            .with_flux(self.wing_flux);
        Profile::Sum(vec![core, wing])
    }
}

/// builds the PSF model for one single-epoch image
pub trait PsfLoader: Send + Sync {
    fn load(&self, config: &PsfConfig, se_info: &SeInfo, wcs: Arc<dyn Wcs>)
        -> Result<Arc<dyn PsfModel>>;
}

/// Analytic PSFs only. The PSFEx flavours need a loader that can read
/// PSFEx files.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinPsfLoader;

impl PsfLoader for BuiltinPsfLoader {
    fn load(
        &self,
        config: &PsfConfig,
        se_info: &SeInfo,
        _wcs: Arc<dyn Wcs>,
    ) -> Result<Arc<dyn PsfModel>> {
        match config {
            PsfConfig::Gauss => Ok(Arc::new(GaussianPsf::round(GAUSS_PSF_FWHM))),
            PsfConfig::GaussPix(params) => Ok(Arc::new(GaussianPsf::from(params))),
            PsfConfig::NonGaussPix(params) => Ok(Arc::new(NonGaussianPsf::from(params))),
            PsfConfig::Psfex | PsfConfig::DesPsfex | PsfConfig::PsfexDeconvolved => {
                let path = se_info.psfex_path.as_ref().ok_or(SimError::InvalidSeInfo(format!(
                    "no psfex_path for {}",
                    se_info.image_path
                )))?;
                Err(SimError::Config(format!(
                    "psf type {:?} needs a PSFEx loader (model {})",
                    config, path
                )))
            }
        }
    }
}
