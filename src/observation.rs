//! Multi-band, multi-epoch observation containers.

use std::collections::BTreeMap;

use ndarray::Array2;
use serde::Serialize;

use crate::{Jacobian, Result, SimError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    Int(i64),
    Float(f64),
}

impl MetaValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            MetaValue::Int(v) => *v as f64,
            MetaValue::Float(v) => *v,
        }
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Float(value)
    }
}

pub type Meta = BTreeMap<String, MetaValue>;

/// one cutout of one object in one epoch
#[derive(Debug, Clone)]
pub struct Observation {
    pub image: Array2<f64>,
    pub weight: Array2<f64>,
    pub noise: Array2<f64>,
    /// nonzero where the pixel is unusable
    pub bmask: Array2<i32>,
    pub jacobian: Jacobian,
    pub meta: Meta,
}

impl Observation {
    pub fn new(
        image: Array2<f64>,
        weight: Array2<f64>,
        noise: Array2<f64>,
        bmask: Array2<i32>,
        jacobian: Jacobian,
    ) -> Result<Self> {
        let shape = image.dim();
        if weight.dim() != shape || noise.dim() != shape || bmask.dim() != shape {
            return Err(SimError::Shape(format!(
                "image {:?}, weight {:?}, noise {:?}, bmask {:?}",
                shape,
                weight.dim(),
                noise.dim(),
                bmask.dim()
            )));
        }
        Ok(Self {
            image,
            weight,
            noise,
            bmask,
            jacobian,
            meta: Meta::new(),
        })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.image.dim()
    }

    /// boolean view of the bad pixel mask
    pub fn bad_pixels(&self) -> Array2<bool> {
        self.bmask.mapv(|v| v != 0)
    }
}

/// all epochs of one object in one band
#[derive(Debug, Clone, Default)]
pub struct ObsList {
    pub obs: Vec<Observation>,
    pub meta: Meta,
}

impl ObsList {
    pub fn new(obs: Vec<Observation>) -> Self {
        Self { obs, meta: Meta::new() }
    }

    /// empty list carrying the same metadata
    pub fn like(&self) -> Self {
        Self {
            obs: vec![],
            meta: self.meta.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.obs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obs.is_empty()
    }
}

/// all bands of one object
#[derive(Debug, Clone, Default)]
pub struct MultiBandObs {
    pub bands: Vec<ObsList>,
    pub meta: Meta,
}

impl MultiBandObs {
    pub fn new(bands: Vec<ObsList>) -> Self {
        Self { bands, meta: Meta::new() }
    }

    pub fn like(&self) -> Self {
        Self {
            bands: vec![],
            meta: self.meta.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jac() -> Jacobian {
        Jacobian::from_scale(0.263, 4.0, 4.0)
    }

    #[test]
    fn mismatched_planes_are_rejected() {
        let res = Observation::new(
            Array2::zeros((9, 9)),
            Array2::zeros((9, 9)),
            Array2::zeros((9, 8)),
            Array2::zeros((9, 9)),
            jac(),
        );
        assert!(matches!(res, Err(SimError::Shape(_))));
    }
}
