//! YAML configuration for the simulation and the metacal fitter.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::draw::DrawMethod;
use crate::{Result, SimError};

/// top level of the simulation config file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SimConfig {
    pub gal_kws: GalKws,
    pub psf_kws: PsfConfig,
}

impl SimConfig {
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: SimConfig = serde_yaml::from_reader(File::open(path)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: SimConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.gal_kws.validate()?;
        self.psf_kws.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GalKws {
    /// galaxies sit on an `n_grid` x `n_grid` grid over the coadd
    pub n_grid: usize,
    pub g1: f64,
    pub g2: f64,
    /// when set, every galaxy is rescaled to this magnitude (zero point 30)
    #[serde(default)]
    pub gal_mag: Option<f64>,
    /// keep the real bad pixel mask (true) or zero it (false)
    #[serde(rename = "Mask")]
    pub mask: bool,
    #[serde(flatten)]
    pub population: PopulationConfig,
}

impl GalKws {
    fn validate(&self) -> Result<()> {
        if self.n_grid == 0 {
            return Err(SimError::Config("n_grid must be positive".to_string()));
        }
        if self.g1.hypot(self.g2) >= 1.0 {
            return Err(SimError::Config(format!(
                "shear ({}, {}) has |g| >= 1",
                self.g1, self.g2
            )));
        }
        self.population.validate()
    }
}

/// size and axis-ratio ranges for the sampled populations
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PopulationRanges {
    /// half light radius, arcsec
    pub size_min: f64,
    pub size_max: f64,
    pub q_min: f64,
    pub q_max: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DescwlConfig {
    /// CSV export of the WeakLensingDeblending galaxy catalog
    pub catalog_path: PathBuf,
    /// force round disks and bulges (b = a)
    #[serde(default = "default_true")]
    pub round: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "gal_source")]
pub enum PopulationConfig {
    #[serde(rename = "simple")]
    Simple,
    #[serde(rename = "varsize")]
    VarSize(PopulationRanges),
    #[serde(rename = "varang")]
    VarAng(PopulationRanges),
    #[serde(rename = "varsizeang")]
    VarSizeAng(PopulationRanges),
    #[serde(rename = "descwl")]
    Descwl(DescwlConfig),
}

impl PopulationConfig {
    fn validate(&self) -> Result<()> {
        match self {
            PopulationConfig::VarSize(r)
            | PopulationConfig::VarAng(r)
            | PopulationConfig::VarSizeAng(r) => {
                if !(r.size_min > 0.0 && r.size_min <= r.size_max) {
                    return Err(SimError::Config(format!(
                        "bad size range [{}, {}]",
                        r.size_min, r.size_max
                    )));
                }
                if !(r.q_min > 0.0 && r.q_min <= r.q_max && r.q_max <= 1.0) {
                    return Err(SimError::Config(format!(
                        "bad axis ratio range [{}, {}]",
                        r.q_min, r.q_max
                    )));
                }
                Ok(())
            }
            PopulationConfig::Simple | PopulationConfig::Descwl(_) => Ok(()),
        }
    }
}

/// parameters of the pixelized analytic PSFs
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PixPsfParams {
    #[serde(default = "default_psf_fwhm")]
    pub fwhm: f64,
    #[serde(default)]
    pub g1: f64,
    #[serde(default)]
    pub g2: f64,
}

fn default_psf_fwhm() -> f64 {
    0.9
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum PsfConfig {
    #[serde(rename = "gauss")]
    Gauss,
    #[serde(rename = "gauss-pix")]
    GaussPix(PixPsfParams),
    #[serde(rename = "nongauss-pix")]
    NonGaussPix(PixPsfParams),
    #[serde(rename = "psfex")]
    Psfex,
    #[serde(rename = "des_psfex")]
    DesPsfex,
    #[serde(rename = "psfex_deconvolved")]
    PsfexDeconvolved,
}

impl PsfConfig {
    /// PSFEx models already contain the pixel, everything else needs it added
    pub fn draw_method(&self) -> DrawMethod {
        match self {
            PsfConfig::Psfex => DrawMethod::NoPixel,
            _ => DrawMethod::Auto,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            PsfConfig::GaussPix(p) | PsfConfig::NonGaussPix(p) if p.fwhm <= 0.0 => Err(
                SimError::Config(format!("psf fwhm must be positive, got {}", p.fwhm)),
            ),
            _ => Ok(()),
        }
    }
}

// metacal fitter configuration

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LmPars {
    pub maxfev: usize,
    pub xtol: f64,
    pub ftol: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MaxLikePars {
    pub method: String,
    pub lm_pars: LmPars,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MaxPars {
    pub ntry: usize,
    pub pars: MaxLikePars,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Prior {
    #[serde(rename = "normal2d")]
    Normal2d { sigma: f64 },
    #[serde(rename = "ba")]
    Ba { sigma: f64 },
    #[serde(rename = "two-sided-erf")]
    TwoSidedErf { pars: [f64; 4] },
    #[serde(rename = "flat")]
    Flat { pars: [f64; 2] },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Priors {
    pub cen: Prior,
    pub g: Prior,
    #[serde(rename = "T")]
    pub t: Prior,
    pub flux: Prior,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PsfFitConfig {
    pub model: String,
    pub ntry: usize,
    pub lm_pars: LmPars,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MetacalPars {
    pub psf: String,
    pub types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetacalConfig {
    /// bits that flag an edge hit
    pub bmask_flags: i64,
    pub model: String,
    pub max_pars: MaxPars,
    pub priors: Priors,
    pub psf: PsfFitConfig,
    pub metacal_pars: MetacalPars,
}

impl Default for MetacalConfig {
    fn default() -> Self {
        Self {
            bmask_flags: 1 << 30,
            model: "gauss".to_string(),
            max_pars: MaxPars {
                ntry: 2,
                pars: MaxLikePars {
                    method: "lm".to_string(),
                    lm_pars: LmPars {
                        maxfev: 2000,
                        xtol: 5.0e-5,
                        ftol: 5.0e-5,
                    },
                },
            },
            priors: Priors {
                cen: Prior::Normal2d { sigma: 0.263 },
                g: Prior::Ba { sigma: 0.2 },
                t: Prior::TwoSidedErf {
                    pars: [-1.0, 0.1, 1.0e+06, 1.0e+05],
                },
                flux: Prior::TwoSidedErf {
                    pars: [-100.0, 1.0, 1.0e+09, 1.0e+08],
                },
            },
            psf: PsfFitConfig {
                model: "gauss".to_string(),
                ntry: 2,
                lm_pars: LmPars {
                    maxfev: 2000,
                    ftol: 1.0e-5,
                    xtol: 1.0e-5,
                },
            },
            metacal_pars: MetacalPars {
                psf: "fitgauss".to_string(),
                types: ["noshear", "1p", "1m", "2p", "2m"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
        }
    }
}

impl MetacalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.metacal_pars.types.is_empty() {
            return Err(SimError::Config("no metacal types requested".to_string()));
        }
        if !self.metacal_pars.types.iter().any(|t| t == "noshear") {
            return Err(SimError::Config("metacal types must include noshear".to_string()));
        }
        Ok(())
    }
}
