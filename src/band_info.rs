//! Band-info records describing the coadd and its single-epoch images.
//!
//! These YAML files are produced by the band-info preparation step; this
//! crate only reads them.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::files::expand_path;
use crate::io::resolve_ext;
use crate::{Result, SimError};

/// an HDU reference, either by position or by EXTNAME
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Ext {
    Index(usize),
    Name(String),
}

impl Default for Ext {
    fn default() -> Self {
        Ext::Index(0)
    }
}

/// one single-epoch image of the tile
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SeInfo {
    pub image_path: String,
    pub image_ext: Ext,
    pub weight_path: String,
    pub weight_ext: Ext,
    pub bmask_path: String,
    pub bmask_ext: Ext,
    pub bkg_path: String,
    pub bkg_ext: Ext,
    /// (rows, cols)
    pub image_shape: [usize; 2],
    /// offset between the zero-indexed array and the WCS pixel convention
    pub position_offset: f64,
    /// photometric scale removed to get back to ADU
    pub scale: f64,
    #[serde(default)]
    pub psfex_path: Option<String>,
}

impl SeInfo {
    pub fn image_file(&self) -> PathBuf {
        expand_path(&self.image_path)
    }

    pub fn bkg_file(&self) -> PathBuf {
        expand_path(&self.bkg_path)
    }

    /// image, weight and mask live in one file; the background in another
    pub fn check_layout(&self) -> Result<()> {
        if self.image_path != self.weight_path {
            return Err(SimError::InvalidSeInfo(format!(
                "weight path {} differs from image path {}",
                self.weight_path, self.image_path
            )));
        }
        if self.image_path != self.bmask_path {
            return Err(SimError::InvalidSeInfo(format!(
                "bmask path {} differs from image path {}",
                self.bmask_path, self.image_path
            )));
        }
        if self.image_path == self.bkg_path {
            return Err(SimError::InvalidSeInfo(format!(
                "background shares the image file {}",
                self.image_path
            )));
        }
        Ok(())
    }

    pub fn image_hdu(&self) -> Result<usize> {
        resolve_ext(self.image_file(), &self.image_ext)
    }
}

/// the coadd of one band plus all of its single-epoch sources
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BandInfo {
    pub image_path: String,
    #[serde(default)]
    pub image_ext: Ext,
    /// (rows, cols) of the coadd; DES tiles are 10000 pixels on a side
    #[serde(default = "default_coadd_shape")]
    pub image_shape: [usize; 2],
    pub src_info: Vec<SeInfo>,
}

fn default_coadd_shape() -> [usize; 2] {
    [10_000, 10_000]
}

impl BandInfo {
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(serde_yaml::from_reader(File::open(path)?)?)
    }

    pub fn image_hdu(&self) -> Result<usize> {
        resolve_ext(expand_path(&self.image_path), &self.image_ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn se_info() -> SeInfo {
        SeInfo {
            image_path: "/data/se_001.fits".to_string(),
            image_ext: Ext::Name("sci".to_string()),
            weight_path: "/data/se_001.fits".to_string(),
            weight_ext: Ext::Name("wgt".to_string()),
            bmask_path: "/data/se_001.fits".to_string(),
            bmask_ext: Ext::Name("msk".to_string()),
            bkg_path: "/data/se_001_bkg.fits".to_string(),
            bkg_ext: Ext::Index(0),
            image_shape: [4096, 2048],
            position_offset: 1.0,
            scale: 1.2,
            psfex_path: None,
        }
    }

    #[test]
    fn layout_checks() {
        assert!(se_info().check_layout().is_ok());
        let mut bad = se_info();
        bad.weight_path = "/data/other.fits".to_string();
        assert!(matches!(bad.check_layout(), Err(SimError::InvalidSeInfo(_))));
        let mut bad = se_info();
        bad.bkg_path = bad.image_path.clone();
        assert!(bad.check_layout().is_err());
    }

    #[test]
    fn yaml_roundtrip_keeps_ext_kinds() {
        let info = BandInfo {
            image_path: "/data/coadd.fits".to_string(),
            image_ext: Ext::Index(1),
            image_shape: [10_000, 10_000],
            src_info: vec![se_info()],
        };
        let text = serde_yaml::to_string(&info).unwrap();
        let back: BandInfo = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn coadd_shape_defaults_to_des_tile() {
        let info: BandInfo =
            serde_yaml::from_str("image_path: /data/coadd.fits\nsrc_info: []\n").unwrap();
        assert_eq!(info.image_shape, [10_000, 10_000]);
        assert_eq!(info.image_ext, Ext::Index(0));
    }
}
