//! Access to multi-epoch cutout (MEDS) files.
//!
//! Reading MEDS files is left to the caller: implement [`MedsOpener`] for
//! whatever reader is available. Each fitting chunk opens its own handle and
//! the handle is released when it is dropped.

use std::path::PathBuf;

use crate::observation::MultiBandObs;
use crate::Result;

/// one open set of per-band MEDS files, all describing the same objects
pub trait MultiBandMeds {
    /// number of objects
    fn size(&self) -> usize;

    /// every cutout of object `index`, coadd first in each band
    fn get_mbobs(&mut self, index: usize) -> Result<MultiBandObs>;

    /// (orig_col, orig_row) of the object's coadd cutout in the first band
    fn orig_position(&self, index: usize) -> Result<(f64, f64)>;
}

pub trait MedsOpener: Sync {
    type Meds: MultiBandMeds;

    /// open `paths`, one per band, in band order
    fn open(&self, paths: &[PathBuf]) -> Result<Self::Meds>;
}
