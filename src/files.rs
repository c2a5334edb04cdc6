//! Path conventions for the simulation data products.

use std::path::{Component, Path, PathBuf};

use crate::Result;

/// MEDS configuration tag of the simulated products
pub const MEDSCONF: &str = "y3v02";
/// reference magnitude zero point of the coadds
pub const MAGZP_REF: f64 = 30.0;

const SIM_DIR: &str = "simple_des_y3_sims";

/// where every product of a run lives under the output DESDATA directory
#[derive(Debug, Clone, PartialEq)]
pub struct FileLayout {
    pub meds_dir: PathBuf,
    pub medsconf: String,
}

impl FileLayout {
    pub fn new<P: AsRef<Path>>(meds_dir: P) -> Self {
        Self {
            meds_dir: meds_dir.as_ref().to_path_buf(),
            medsconf: MEDSCONF.to_string(),
        }
    }

    fn sim_root(&self) -> PathBuf {
        self.meds_dir.join(SIM_DIR).join(&self.medsconf)
    }

    pub fn band_info_file(&self, tilename: &str, band: &str) -> PathBuf {
        self.sim_root()
            .join("band_info_files")
            .join(format!("{}_{}_info.yaml", tilename, band))
    }

    pub fn truth_catalog_path(&self, tilename: &str) -> PathBuf {
        self.sim_root()
            .join("truthcats")
            .join(format!("{}_truthcat.csv", tilename))
    }

    pub fn meds_file_path(&self, tilename: &str, band: &str) -> PathBuf {
        self.meds_dir
            .join(&self.medsconf)
            .join(tilename)
            .join(format!("{}_{}_meds-{}.fits.fz", tilename, band, self.medsconf))
    }

    pub fn mcal_file_path(&self, tilename: &str) -> PathBuf {
        self.sim_root()
            .join("metacal")
            .join(format!("{}_metacal.fits", tilename))
    }

    /// bands that have a band-info file for this tile, sorted
    pub fn discover_bands(&self, tilename: &str) -> Result<Vec<String>> {
        let pattern = self.band_info_file(tilename, "*");
        let prefix = format!("{}_", tilename);
        let mut bands = glob::glob(&pattern.to_string_lossy())?
            .map(|path| {
                let path = path?;
                let stem = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                Ok(stem
                    .trim_start_matches(&prefix)
                    .trim_end_matches("_info.yaml")
                    .to_string())
            })
            .collect::<Result<Vec<String>>>()?;
        bands.sort();
        Ok(bands)
    }
}

/// expand a leading `~` and any `$VAR` / `${VAR}` references; unknown
/// variables are left as written
pub fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::full_with_context_no_errors(
        path,
        || std::env::var("HOME").ok(),
        |name| std::env::var(name).ok(),
    );
    PathBuf::from(expanded.as_ref())
}

pub fn make_dirs_for_file<P: AsRef<Path>>(path: P) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Destination of a rewritten input file: inputs staged under `tmp_dir` are
/// moved under `output_dir`, anything else is rewritten where it is.
pub fn output_path_for(source: &Path, tmp_dir: Option<&Path>, output_dir: &Path) -> PathBuf {
    match tmp_dir.and_then(|tmp| source.strip_prefix(tmp).ok()) {
        Some(relative) => {
            let relative: PathBuf = relative
                .components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .collect();
            output_dir.join(relative)
        }
        None => source.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let layout = FileLayout::new("/out");
        assert_eq!(
            layout.meds_file_path("DES0003-3832", "r"),
            PathBuf::from("/out/y3v02/DES0003-3832/DES0003-3832_r_meds-y3v02.fits.fz")
        );
        assert_eq!(
            layout.truth_catalog_path("DES0003-3832"),
            PathBuf::from("/out/simple_des_y3_sims/y3v02/truthcats/DES0003-3832_truthcat.csv")
        );
        assert!(layout
            .mcal_file_path("T")
            .ends_with("simple_des_y3_sims/y3v02/metacal/T_metacal.fits"));
    }

    #[test]
    fn expands_variables() {
        std::env::set_var("DESY3SIM_TEST_ROOT", "/scratch");
        assert_eq!(
            expand_path("$DESY3SIM_TEST_ROOT/a/${DESY3SIM_TEST_ROOT}/b.fits"),
            PathBuf::from("/scratch/a//scratch/b.fits")
        );
        assert_eq!(
            expand_path("$DESY3SIM_TEST_UNSET_VAR/x"),
            PathBuf::from("$DESY3SIM_TEST_UNSET_VAR/x")
        );
        assert_eq!(expand_path("/plain/path"), PathBuf::from("/plain/path"));
    }

    #[test]
    fn expands_home() {
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(expand_path("~/meds/x.fits"), Path::new(&home).join("meds/x.fits"));
        }
        assert_eq!(expand_path("a~b"), PathBuf::from("a~b"));
    }

    #[test]
    fn output_path_moves_out_of_tmp() {
        let out = output_path_for(
            Path::new("/tmp/job/DES0003/se_r.fits"),
            Some(Path::new("/tmp/job")),
            Path::new("/out"),
        );
        assert_eq!(out, PathBuf::from("/out/DES0003/se_r.fits"));
        let same = output_path_for(Path::new("/data/se_r.fits"), Some(Path::new("/tmp/job")), Path::new("/out"));
        assert_eq!(same, PathBuf::from("/data/se_r.fits"));
    }

    #[test]
    fn discovers_bands() {
        let dir = tempfile::tempdir().unwrap();
        let layout = FileLayout::new(dir.path());
        for band in ["z", "r", "i"] {
            let path = layout.band_info_file("DES0003", band);
            make_dirs_for_file(&path).unwrap();
            std::fs::write(&path, "").unwrap();
        }
        assert_eq!(layout.discover_bands("DES0003").unwrap(), vec!["i", "r", "z"]);
    }
}
