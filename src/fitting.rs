//! Fitting one chunk of objects.

use std::path::PathBuf;

use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::config::MetacalConfig;
use crate::files::MAGZP_REF;
use crate::meds::{MedsOpener, MultiBandMeds};
use crate::observation::{MetaValue, MultiBandObs};
use crate::preprocess::{all_bands_have_images, preprocess};
use crate::{FitError, Result};

/// half-open range of object indices with its own seed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: usize,
    pub end: usize,
    pub seed: u64,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A shear-measurement capability. `Range` errors drop the object, any
/// other error stops the run.
pub trait ShearFitter: Sync {
    type Record: Serialize + Send;

    fn fit(
        &self,
        config: &MetacalConfig,
        mbobs: &MultiBandObs,
        rng: &mut ChaCha8Rng,
    ) -> std::result::Result<Self::Record, FitError>;
}

/// metadata the fitter expects on every object
pub fn stamp_meta(mbobs: &mut MultiBandObs, index: usize, orig_pos: (f64, f64)) {
    mbobs
        .meta
        .insert("id".to_string(), MetaValue::Int(index as i64));
    if let Some(band) = mbobs.bands.first_mut() {
        band.meta.insert("Tsky".to_string(), MetaValue::Int(1));
        band.meta
            .insert("magzp_ref".to_string(), MetaValue::Float(MAGZP_REF));
        if let Some(obs) = band.obs.first_mut() {
            obs.meta
                .insert("orig_col".to_string(), MetaValue::Float(orig_pos.0));
            obs.meta
                .insert("orig_row".to_string(), MetaValue::Float(orig_pos.1));
        }
    }
}

/// Fit every object of `chunk`. Objects that lose a band in preprocessing or
/// hit a range error are skipped. Returns `None` when nothing was fit.
pub fn fit_chunk<O, F>(
    opener: &O,
    meds_files: &[PathBuf],
    chunk: &Chunk,
    fitter: &F,
    config: &MetacalConfig,
) -> Result<Option<Vec<F::Record>>>
where
    O: MedsOpener,
    F: ShearFitter,
{
    let mut rng = ChaCha8Rng::seed_from_u64(chunk.seed);
    // pixel interpolation draws from its own stream
    let mut interp_rng = ChaCha8Rng::seed_from_u64(rng.gen_range(1..1u64 << 30));

    let mut meds = opener.open(meds_files)?;
    let mut data = vec![];
    for ind in chunk.start..chunk.end {
        let mut mbobs = preprocess(meds.get_mbobs(ind)?, &mut interp_rng);
        if !all_bands_have_images(&mbobs) {
            debug!(" object {}: not all bands have images - skipping!", ind);
            continue;
        }
        stamp_meta(&mut mbobs, ind, meds.orig_position(ind)?);

        match fitter.fit(config, &mbobs, &mut rng) {
            Ok(res) => data.push(res),
            Err(FitError::Range(msg)) => {
                debug!(" object {}: metacal error: {}", ind, msg);
            }
            Err(err) => return Err(err.into()),
        }
    }
    debug!(
        " chunk [{}, {}): {} of {} fits worked",
        chunk.start,
        chunk.end,
        data.len(),
        chunk.len()
    );
    Ok((!data.is_empty()).then_some(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{ObsList, Observation};
    use crate::{Jacobian, SimError};
    use ndarray::Array2;
    use serde::Serialize;

    fn epoch(flux: f64) -> Observation {
        let mut image = Array2::zeros((16, 16));
        image[[8, 8]] = flux;
        Observation::new(
            image,
            Array2::from_elem((16, 16), 1.0),
            Array2::zeros((16, 16)),
            Array2::zeros((16, 16)),
            Jacobian::from_scale(0.263, 7.5, 7.5),
        )
        .unwrap()
    }

    /// objects alternate between one and zero flux in their only epoch
    struct Alternating {
        n: usize,
    }

    impl MultiBandMeds for Alternating {
        fn size(&self) -> usize {
            self.n
        }

        fn get_mbobs(&mut self, index: usize) -> Result<MultiBandObs> {
            let flux = if index % 2 == 0 { 1.0 } else { 0.0 };
            Ok(MultiBandObs::new(vec![ObsList::new(vec![epoch(5.0), epoch(flux)])]))
        }

        fn orig_position(&self, index: usize) -> Result<(f64, f64)> {
            Ok((index as f64, 2.0 * index as f64))
        }
    }

    struct Opener(usize);

    impl MedsOpener for Opener {
        type Meds = Alternating;

        fn open(&self, _paths: &[PathBuf]) -> Result<Alternating> {
            Ok(Alternating { n: self.0 })
        }
    }

    #[derive(Debug, Serialize, PartialEq)]
    struct Rec {
        id: i64,
        orig_row: f64,
        draw: u32,
    }

    struct EchoFitter;

    impl ShearFitter for EchoFitter {
        type Record = Rec;

        fn fit(
            &self,
            _config: &MetacalConfig,
            mbobs: &MultiBandObs,
            rng: &mut ChaCha8Rng,
        ) -> std::result::Result<Rec, FitError> {
            let id = mbobs.meta["id"].as_f64() as i64;
            if id == 4 {
                return Err(FitError::Range("T <= 0".to_string()));
            }
            Ok(Rec {
                id,
                orig_row: mbobs.bands[0].obs[0].meta["orig_row"].as_f64(),
                draw: rng.gen(),
            })
        }
    }

    struct FatalFitter;

    impl ShearFitter for FatalFitter {
        type Record = Rec;

        fn fit(
            &self,
            _config: &MetacalConfig,
            _mbobs: &MultiBandObs,
            _rng: &mut ChaCha8Rng,
        ) -> std::result::Result<Rec, FitError> {
            Err(FitError::Fatal("bad config".to_string()))
        }
    }

    #[test]
    fn chunk_skips_empty_and_range_failures() {
        let chunk = Chunk { start: 0, end: 7, seed: 11 };
        let out = fit_chunk(&Opener(7), &[], &chunk, &EchoFitter, &MetacalConfig::default())
            .unwrap()
            .unwrap();
        let ids: Vec<i64> = out.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 2, 6]);
        assert_eq!(out[1].orig_row, 4.0);
    }

    #[test]
    fn chunk_is_reproducible() {
        let chunk = Chunk { start: 0, end: 4, seed: 5 };
        let config = MetacalConfig::default();
        let a = fit_chunk(&Opener(4), &[], &chunk, &EchoFitter, &config).unwrap();
        let b = fit_chunk(&Opener(4), &[], &chunk, &EchoFitter, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_chunk_gives_none() {
        let chunk = Chunk { start: 1, end: 2, seed: 5 };
        let out = fit_chunk(&Opener(4), &[], &chunk, &EchoFitter, &MetacalConfig::default());
        assert_eq!(out.unwrap(), None);
    }

    #[test]
    fn fatal_fit_errors_propagate() {
        let chunk = Chunk { start: 0, end: 1, seed: 5 };
        let out = fit_chunk(&Opener(4), &[], &chunk, &FatalFitter, &MetacalConfig::default());
        assert!(matches!(out, Err(SimError::Fit(_))));
    }

    #[test]
    fn stamps_metadata() {
        let mut mbobs = MultiBandObs::new(vec![ObsList::new(vec![epoch(1.0)])]);
        stamp_meta(&mut mbobs, 12, (3.5, 4.5));
        assert_eq!(mbobs.meta["id"], MetaValue::Int(12));
        assert_eq!(mbobs.bands[0].meta["Tsky"], MetaValue::Int(1));
        assert_eq!(mbobs.bands[0].meta["magzp_ref"], MetaValue::Float(30.0));
        assert_eq!(mbobs.bands[0].obs[0].meta["orig_col"], MetaValue::Float(3.5));
    }
}
