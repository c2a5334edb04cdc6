//! Galaxy populations: which profile each truth-catalog entry gets.

use std::path::Path;
use std::sync::Arc;

use log::info;
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{PopulationConfig, PopulationRanges};
use crate::io::read_table;
use crate::profile::Profile;
use crate::{Result, SimError, Shear};

/// rows drawn for the sampled populations, more than any tile needs
pub const SIMULATED_CATALOG_SIZE: usize = 500_000;

const DEFAULT_HLR: f64 = 0.5;

/// column-major table of sampled galaxy properties
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedCatalog {
    /// half light radius, arcsec
    pub size: Vec<f64>,
    /// axis ratio b/a
    pub q: Vec<f64>,
    /// position angle, degrees
    pub ang_rot: Vec<f64>,
}

impl SimulatedCatalog {
    pub fn sample<R: Rng + ?Sized>(rng: &mut R, n: usize, ranges: &PopulationRanges) -> Self {
        let mut column = |lo: f64, hi: f64| -> Vec<f64> {
            let dist = Uniform::new_inclusive(lo, hi);
            (0..n).map(|_| dist.sample(rng)).collect()
        };
        let size = column(ranges.size_min, ranges.size_max);
        let q = column(ranges.q_min, ranges.q_max);
        let ang_rot = column(0.0, 360.0);
        Self { size, q, ang_rot }
    }

    pub fn len(&self) -> usize {
        self.size.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    fn check(&self, ind: usize) -> Result<()> {
        if ind >= self.len() {
            return Err(SimError::BadIndex(ind, self.len()));
        }
        Ok(())
    }
}

/// one galaxy of the WeakLensingDeblending catalog
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DescwlRow {
    /// disk semi-major and semi-minor axes, arcsec
    pub a_d: f64,
    pub b_d: f64,
    /// bulge semi-major and semi-minor axes, arcsec
    pub a_b: f64,
    pub b_b: f64,
    /// degrees
    pub pa_disk: f64,
    pub pa_bulge: f64,
    pub fluxnorm_disk: f64,
    pub fluxnorm_bulge: f64,
    pub i_ab: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DescwlCatalog {
    pub rows: Vec<DescwlRow>,
}

impl DescwlCatalog {
    /// Load the catalog. With `round` the disks and bulges lose their
    /// ellipticity (b = a).
    pub fn from_csv<P: AsRef<Path>>(path: P, round: bool) -> Result<Self> {
        let mut rows: Vec<DescwlRow> = read_table(path.as_ref())?;
        if round {
            for row in rows.iter_mut() {
                row.b_d = row.a_d;
                row.b_b = row.a_b;
            }
        }
        info!(" loaded {} descwl galaxies from {}", rows.len(), path.as_ref().display());
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, ind: usize) -> Result<&DescwlRow> {
        self.rows.get(ind).ok_or(SimError::BadIndex(ind, self.rows.len()))
    }
}

fn component(profile: Profile, a: f64, b: f64, pa: f64) -> Profile {
    if a <= 0.0 {
        return profile;
    }
    let q = (b / a).clamp(0.0, 1.0);
    if q < 1.0 {
        profile.shear(Shear::from_q_beta(q, pa))
    } else {
        profile
    }
}

/// disk plus bulge, total flux set by the i-band magnitude at zero point 30
pub fn get_descwl_galaxy(row: &DescwlRow) -> Profile {
    let total = 10f64.powf((30.0 - row.i_ab) / 2.5);
    let norm = row.fluxnorm_disk + row.fluxnorm_bulge;
    let (f_disk, f_bulge) = if norm > 0.0 {
        (row.fluxnorm_disk / norm, row.fluxnorm_bulge / norm)
    } else {
        (1.0, 0.0)
    };

    let mut parts = vec![];
    if f_disk > 0.0 {
        let hlr = (row.a_d * row.b_d).sqrt();
        let disk = Profile::exponential(hlr).with_flux(f_disk * total);
        parts.push(component(disk, row.a_d, row.b_d, row.pa_disk));
    }
    if f_bulge > 0.0 {
        let hlr = (row.a_b * row.b_b).sqrt();
        let bulge = Profile::de_vaucouleurs(hlr).with_flux(f_bulge * total);
        parts.push(component(bulge, row.a_b, row.b_b, row.pa_bulge));
    }
    Profile::Sum(parts)
}

/// the galaxy model of a run, with whatever table it draws from
#[derive(Debug, Clone)]
pub enum GalaxyPopulation {
    /// one round exponential for every object
    Simple,
    VarSize(Arc<SimulatedCatalog>),
    VarAng(Arc<SimulatedCatalog>),
    VarSizeAng(Arc<SimulatedCatalog>),
    Descwl(Arc<DescwlCatalog>),
}

impl GalaxyPopulation {
    pub fn from_config<R: Rng + ?Sized>(config: &PopulationConfig, rng: &mut R) -> Result<Self> {
        let population = match config {
            PopulationConfig::Simple => GalaxyPopulation::Simple,
            PopulationConfig::VarSize(ranges) => GalaxyPopulation::VarSize(Arc::new(
                SimulatedCatalog::sample(rng, SIMULATED_CATALOG_SIZE, ranges),
            )),
            PopulationConfig::VarAng(ranges) => GalaxyPopulation::VarAng(Arc::new(
                SimulatedCatalog::sample(rng, SIMULATED_CATALOG_SIZE, ranges),
            )),
            PopulationConfig::VarSizeAng(ranges) => GalaxyPopulation::VarSizeAng(Arc::new(
                SimulatedCatalog::sample(rng, SIMULATED_CATALOG_SIZE, ranges),
            )),
            PopulationConfig::Descwl(cfg) => GalaxyPopulation::Descwl(Arc::new(
                DescwlCatalog::from_csv(&cfg.catalog_path, cfg.round)?,
            )),
        };
        Ok(population)
    }

    /// intrinsic galaxy for table row `ind`, before flux normalization,
    /// shear and PSF
    pub fn galaxy(&self, ind: usize) -> Result<Profile> {
        let gal = match self {
            GalaxyPopulation::Simple => Profile::exponential(DEFAULT_HLR),
            GalaxyPopulation::VarSize(cat) => {
                cat.check(ind)?;
                Profile::exponential(cat.size[ind])
            }
            GalaxyPopulation::VarAng(cat) => {
                cat.check(ind)?;
                Profile::exponential(DEFAULT_HLR)
                    .shear(Shear::from_q_beta(cat.q[ind], cat.ang_rot[ind]))
            }
            GalaxyPopulation::VarSizeAng(cat) => {
                cat.check(ind)?;
                Profile::exponential(cat.size[ind])
                    .shear(Shear::from_q_beta(cat.q[ind], cat.ang_rot[ind]))
            }
            GalaxyPopulation::Descwl(cat) => get_descwl_galaxy(cat.row(ind)?),
        };
        Ok(gal)
    }
}
