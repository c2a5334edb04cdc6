//! Sources built on demand from the truth catalog.

use std::sync::Arc;

use crate::population::GalaxyPopulation;
use crate::profile::Profile;
use crate::psf::PsfModel;
use crate::truth::TruthRecord;
use crate::wcs::Wcs;
use crate::{Result, SimError, Shear, Vec2D};

pub trait SourceCatalog: Send + Sync {
    /// the PSF-convolved object for truth entry `index` and where it lands
    /// on the image
    fn source_for(&self, index: usize) -> Result<(Profile, Vec2D)>;
}

/// flux of an object of magnitude `mag` at zero point 30
pub fn flux_for_mag(mag: f64) -> f64 {
    10f64.powf((30.0 - mag) / 2.5)
}

/// Builds each object only when it is drawn. Everything it holds is read
/// only, so one instance serves any number of threads.
#[derive(Clone)]
pub struct LazySourceCat {
    truth: Arc<Vec<TruthRecord>>,
    wcs: Arc<dyn Wcs>,
    psf: Arc<dyn PsfModel>,
    shear: Shear,
    gal_mag: Option<f64>,
    population: GalaxyPopulation,
}

impl LazySourceCat {
    pub fn new(
        truth: Arc<Vec<TruthRecord>>,
        wcs: Arc<dyn Wcs>,
        psf: Arc<dyn PsfModel>,
        shear: Shear,
        gal_mag: Option<f64>,
        population: GalaxyPopulation,
    ) -> Self {
        Self {
            truth,
            wcs,
            psf,
            shear,
            gal_mag,
            population,
        }
    }
}

impl SourceCatalog for LazySourceCat {
    fn source_for(&self, index: usize) -> Result<(Profile, Vec2D)> {
        let rec = self
            .truth
            .get(index)
            .ok_or(SimError::BadIndex(index, self.truth.len()))?;
        let pos = self.wcs.sky_to_image(rec.sky()).ok_or(SimError::Config(format!(
            "truth object {} at ({}, {}) does not project onto the image",
            rec.number, rec.ra, rec.dec
        )))?;

        let row = usize::try_from(rec.ind)
            .map_err(|_| SimError::Config(format!("negative population index {}", rec.ind)))?;
        let mut obj = self.population.galaxy(row)?;
        if let Some(mag) = self.gal_mag {
            obj = obj.with_flux(flux_for_mag(mag));
        }
        let obj = obj.shear(self.shear);
        let psf = self.psf.psf_at(pos);
        Ok((Profile::convolve(vec![obj, psf]), pos))
    }
}
