//! Running metacal over a whole tile, one rayon task per chunk of objects.

use std::path::PathBuf;

use log::{info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::config::MetacalConfig;
use crate::files::FileLayout;
use crate::fitting::{fit_chunk, Chunk, ShearFitter};
use crate::io::write_results_table;
use crate::meds::{MedsOpener, MultiBandMeds};
use crate::{Result, SimError};

/// below this fraction of successful fits the run is flagged in the log
const LOW_SUCCESS_FRAC: f64 = 0.01;

/// HDU holding the per-object results in the metacal output file
pub const MCAL_EXTNAME: &str = "mcal";

#[derive(Debug, Clone, PartialEq)]
pub struct MetacalSummary {
    pub n_objects: usize,
    pub n_fit: usize,
    pub path: PathBuf,
}

/// objects per chunk so that `n_chunks` chunks cover `n` objects
pub fn n_obj_per_chunk(n: usize, n_chunks: usize) -> usize {
    if n_chunks == 0 {
        return n;
    }
    n.div_ceil(n_chunks)
}

/// one seed per chunk in [1, 2^30), fixed by the master seed
pub fn chunk_seeds(seed: u64, n_chunks: usize) -> Vec<u64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n_chunks).map(|_| rng.gen_range(1..1u64 << 30)).collect()
}

/// Split [0, n) into at most `n_chunks` contiguous, non-empty chunks. The
/// last chunk may be short. Chunk `i` always gets the `i`th seed, so
/// dropping empty chunks does not reseed the others.
pub fn make_chunks(n: usize, n_chunks: usize, seed: u64) -> Vec<Chunk> {
    let per = n_obj_per_chunk(n, n_chunks);
    chunk_seeds(seed, n_chunks)
        .into_iter()
        .enumerate()
        .map(|(i, seed)| {
            let start = (i * per).min(n);
            Chunk {
                start,
                end: (start + per).min(n),
                seed,
            }
        })
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

/// Fit every object of a tile and write the results table. Fails, writing
/// nothing, if no chunk produced a single fit.
#[allow(clippy::too_many_arguments)]
pub fn run_metacal<O, F>(
    layout: &FileLayout,
    tilename: &str,
    bands: &[String],
    seed: u64,
    opener: &O,
    fitter: &F,
    config: &MetacalConfig,
    n_workers: Option<usize>,
) -> Result<MetacalSummary>
where
    O: MedsOpener,
    F: ShearFitter,
{
    config.validate()?;
    let meds_files: Vec<PathBuf> = bands
        .iter()
        .map(|band| layout.meds_file_path(tilename, band))
        .collect();
    let reference = meds_files
        .first()
        .ok_or(SimError::Config("no bands to fit".to_string()))?;
    let n = opener.open(std::slice::from_ref(reference))?.size();
    info!(" meds files {:?}", meds_files);

    let n_chunks = match n_workers {
        Some(w) => w,
        None => std::thread::available_parallelism()?.get(),
    };
    if n_chunks == 0 {
        return Err(SimError::Config("need at least one worker".to_string()));
    }
    let chunks = make_chunks(n, n_chunks, seed);
    info!(" running metacal for {} objects in {} chunks", n, chunks.len());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(chunks.len().max(1))
        .build()?;
    let outputs = pool.install(|| {
        chunks
            .par_iter()
            .map(|chunk| fit_chunk(opener, &meds_files, chunk, fitter, config))
            .collect::<Result<Vec<_>>>()
    })?;

    if outputs.iter().all(Option::is_none) {
        return Err(SimError::AllFitsFailed);
    }
    let output: Vec<F::Record> = outputs.into_iter().flatten().flatten().collect();
    info!(" {} of {} metacal fits worked!", output.len(), n);
    if (output.len() as f64) < LOW_SUCCESS_FRAC * n as f64 {
        warn!(
            " only {} of {} objects were fit; check the inputs of tile {}",
            output.len(),
            n,
            tilename
        );
    }

    let path = layout.mcal_file_path(tilename);
    info!(" metacal output: {}", path.display());
    write_results_table(&path, MCAL_EXTNAME, &output)?;
    Ok(MetacalSummary {
        n_objects: n,
        n_fit: output.len(),
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_cover_the_catalog() {
        for n in [0, 1, 7, 100, 101, 1013] {
            for w in [1, 2, 3, 8, 16] {
                let chunks = make_chunks(n, w, 42);
                assert!(chunks.len() <= w);
                let mut next = 0;
                for c in &chunks {
                    assert_eq!(c.start, next);
                    assert!(c.end > c.start);
                    next = c.end;
                }
                assert_eq!(next, n);
                let per = n_obj_per_chunk(n, w);
                assert!(chunks.iter().all(|c| c.len() <= per));
                if let (Some(first), Some(last)) = (chunks.first(), chunks.last()) {
                    assert!(last.len() <= first.len());
                }
            }
        }
    }

    #[test]
    fn empty_trailing_chunks_are_dropped() {
        // 10 objects over 8 workers: 2 per chunk fills only 5 chunks
        let chunks = make_chunks(10, 8, 42);
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.len() == 2));
        let seeds = chunk_seeds(42, 8);
        for (chunk, seed) in chunks.iter().zip(&seeds) {
            assert_eq!(chunk.seed, *seed);
        }
        assert_eq!(make_chunks(3, 16, 42).len(), 3);
        assert!(make_chunks(0, 4, 42).is_empty());
    }

    #[test]
    fn seeds_are_deterministic_and_in_range() {
        let a = chunk_seeds(1234, 8);
        assert_eq!(a, chunk_seeds(1234, 8));
        assert_ne!(a, chunk_seeds(1235, 8));
        assert!(a.iter().all(|s| (1..1 << 30).contains(s)));
        // more chunks extend the same sequence
        assert_eq!(&chunk_seeds(1234, 10)[..8], &a[..]);
    }

    #[test]
    fn per_chunk_rounds_up() {
        assert_eq!(n_obj_per_chunk(10, 3), 4);
        assert_eq!(n_obj_per_chunk(9, 3), 3);
        assert_eq!(n_obj_per_chunk(0, 3), 0);
    }
}
