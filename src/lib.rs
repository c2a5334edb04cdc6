//! DES Y3-style image simulations and chunked metacal orchestration.
//!
//! The simulation side builds a truth catalog on a coadd grid and renders
//! every single-epoch image of a tile ([`simulation::Simulation`]). The
//! measurement side splits the objects of a tile into chunks, cleans each
//! object's cutouts and hands them to a shear fitter
//! ([`metacal::run_metacal`]). Reading MEDS files and the fitter itself are
//! supplied by the caller through [`meds::MedsOpener`] and
//! [`fitting::ShearFitter`].

mod errors;
pub mod band_info;
pub mod config;
pub mod draw;
pub mod files;
pub mod fitting;
pub mod geom;
pub mod interpolate;
pub mod io;
pub mod meds;
pub mod metacal;
pub mod observation;
pub mod population;
pub mod preprocess;
pub mod profile;
pub mod psf;
pub mod render;
pub mod simulation;
pub mod sky_bounds;
pub mod source;
pub mod staging;
pub mod stats;
pub mod truth;
pub mod wcs;

pub use crate::errors::{FitError, Result, SimError};
pub use crate::geom::{Jacobian, Moments, Shear, SkyCoord, Vec2D};
