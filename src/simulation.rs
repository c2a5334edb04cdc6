//! End-to-end simulation of one coadd tile: truth catalog, then every
//! single-epoch image of every band.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::band_info::BandInfo;
use crate::config::SimConfig;
use crate::draw::{DrawKernel, MomentKernel};
use crate::files::{expand_path, FileLayout};
use crate::population::GalaxyPopulation;
use crate::psf::{BuiltinPsfLoader, PsfLoader};
use crate::render::{render_se_image, RenderJob, BOUNDS_BUFFER_UV};
use crate::source::LazySourceCat;
use crate::truth::{make_coadd_grid_radec, make_truth_catalog, write_truth_catalog, TruthCatalog};
use crate::wcs::{TanWcs, Wcs};
use crate::{Result, SimError, Shear};

/// seeds derived from the master seed; only the first three are used
const N_SEEDS: usize = 10;

pub struct Simulation {
    layout: FileLayout,
    tilename: String,
    bands: Vec<String>,
    config: SimConfig,
    info: BTreeMap<String, BandInfo>,
    galdither_rng: ChaCha8Rng,
    noise_rng: ChaCha8Rng,
    galsource_rng: ChaCha8Rng,
    psf_loader: Arc<dyn PsfLoader>,
    kernel: Arc<dyn DrawKernel>,
    tmp_dir: Option<PathBuf>,
    bounds_buffer_uv: f64,
}

impl Simulation {
    /// load the band info of every band and derive the run's RNG streams
    pub fn new(
        seed: u64,
        layout: FileLayout,
        tilename: &str,
        bands: &[String],
        config: SimConfig,
    ) -> Result<Self> {
        if bands.is_empty() {
            return Err(SimError::Config("no bands to simulate".to_string()));
        }
        let mut master = ChaCha8Rng::seed_from_u64(seed);
        let seeds: Vec<u64> = (0..N_SEEDS).map(|_| master.gen_range(1..1u64 << 30)).collect();

        let mut info = BTreeMap::new();
        for band in bands {
            let fname = layout.band_info_file(tilename, band);
            info.insert(band.clone(), BandInfo::from_yaml(&fname)?);
        }

        Ok(Self {
            layout,
            tilename: tilename.to_string(),
            bands: bands.to_vec(),
            config,
            info,
            galdither_rng: ChaCha8Rng::seed_from_u64(seeds[0]),
            noise_rng: ChaCha8Rng::seed_from_u64(seeds[1]),
            galsource_rng: ChaCha8Rng::seed_from_u64(seeds[2]),
            psf_loader: Arc::new(BuiltinPsfLoader),
            kernel: Arc::new(MomentKernel::default()),
            tmp_dir: std::env::var_os("TMPDIR").map(PathBuf::from),
            bounds_buffer_uv: BOUNDS_BUFFER_UV,
        })
    }

    pub fn with_psf_loader(mut self, loader: Arc<dyn PsfLoader>) -> Self {
        self.psf_loader = loader;
        self
    }

    pub fn with_kernel(mut self, kernel: Arc<dyn DrawKernel>) -> Self {
        self.kernel = kernel;
        self
    }

    /// inputs under `tmp_dir` are written to the output directory instead of
    /// in place
    pub fn with_tmp_dir<P: AsRef<Path>>(mut self, tmp_dir: Option<P>) -> Self {
        self.tmp_dir = tmp_dir.map(|p| p.as_ref().to_path_buf());
        self
    }

    fn band_info(&self, band: &str) -> Result<&BandInfo> {
        self.info
            .get(band)
            .ok_or(SimError::Config(format!("no band info for band {}", band)))
    }

    /// build the population and the truth catalog, and write the catalog
    pub fn run_truth(&mut self) -> Result<(GalaxyPopulation, TruthCatalog)> {
        let population =
            GalaxyPopulation::from_config(&self.config.gal_kws.population, &mut self.galsource_rng)?;
        let truth = self.make_truth_catalog(&population)?;
        Ok((population, truth))
    }

    /// simulate the tile, writing every image to disk
    pub fn run(&mut self) -> Result<TruthCatalog> {
        info!(" simulating coadd tile {}", self.tilename);
        let (population, truth) = self.run_truth()?;
        let truth = Arc::new(truth);
        for band in self.bands.clone() {
            self.run_band(&band, &truth, &population)?;
        }
        Ok(Arc::unwrap_or_clone(truth))
    }

    fn make_truth_catalog(&mut self, population: &GalaxyPopulation) -> Result<TruthCatalog> {
        // the grid always comes from the first band's coadd
        let coadd = self.band_info(&self.bands[0])?.clone();
        let coadd_wcs = TanWcs::from_fits(expand_path(&coadd.image_path), coadd.image_hdu()?)?;
        let grid = make_coadd_grid_radec(
            &mut self.galdither_rng,
            &coadd_wcs,
            self.config.gal_kws.n_grid,
            coadd.image_shape[1],
        );
        let truth = make_truth_catalog(&mut self.galsource_rng, &grid, population)?;
        write_truth_catalog(self.layout.truth_catalog_path(&self.tilename), &truth)?;
        Ok(truth)
    }

    fn run_band(
        &mut self,
        band: &str,
        truth: &Arc<TruthCatalog>,
        population: &GalaxyPopulation,
    ) -> Result<()> {
        info!(" rendering images in band {}", band);
        let n_se = self.band_info(band)?.src_info.len();
        let noise_seeds: Vec<u64> = (0..n_se)
            .map(|_| self.noise_rng.gen_range(1..1u64 << 30))
            .collect();

        let info = self.band_info(band)?;
        let gal_kws = &self.config.gal_kws;
        let draw_method = self.config.psf_kws.draw_method();
        let output_dir = self.layout.meds_dir.as_path();
        let tmp_dir = self.tmp_dir.as_deref();

        info.src_info
            .par_iter()
            .zip(noise_seeds.par_iter())
            .map(|(se_info, &noise_seed)| {
                let wcs: Arc<dyn Wcs> =
                    Arc::new(TanWcs::from_fits(se_info.image_file(), se_info.image_hdu()?)?);
                let psf = self
                    .psf_loader
                    .load(&self.config.psf_kws, se_info, wcs.clone())?;
                let src_func = LazySourceCat::new(
                    truth.clone(),
                    wcs.clone(),
                    psf,
                    Shear::new(gal_kws.g1, gal_kws.g2),
                    gal_kws.gal_mag,
                    population.clone(),
                );
                render_se_image(&RenderJob {
                    se_info,
                    band,
                    truth: truth.as_slice(),
                    wcs: wcs.as_ref(),
                    src_func: &src_func,
                    kernel: self.kernel.as_ref(),
                    draw_method,
                    bounds_buffer_uv: self.bounds_buffer_uv,
                    noise_seed,
                    mask: gal_kws.mask,
                    output_meds_dir: output_dir,
                    tmp_dir,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(())
    }
}
