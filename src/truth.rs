//! The truth catalog: where every simulated galaxy sits and which
//! population row it uses.

use std::path::Path;

use log::info;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::io::{read_table, write_table};
use crate::population::GalaxyPopulation;
use crate::wcs::Wcs;
use crate::{Result, SimError, SkyCoord, Vec2D};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TruthRecord {
    /// one-based object number
    pub number: i64,
    /// row of the population table, zero for the simple population
    pub ind: i64,
    pub ra: f64,
    pub dec: f64,
    /// coadd image position, FITS convention
    pub x: f64,
    pub y: f64,
    pub a_world: f64,
    pub b_world: f64,
    pub size: f64,
}

impl TruthRecord {
    pub fn sky(&self) -> SkyCoord {
        SkyCoord::new(self.ra, self.dec)
    }
}

pub type TruthCatalog = Vec<TruthRecord>;

/// one grid point of the coadd
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    pub sky: SkyCoord,
    pub pos: Vec2D,
}

/// An `n_grid` x `n_grid` grid of positions spanning a square coadd of side
/// `coadd_size` pixels, each dithered by up to half a pixel in x and y.
pub fn make_coadd_grid_radec<R: Rng + ?Sized>(
    rng: &mut R,
    coadd_wcs: &dyn Wcs,
    n_grid: usize,
    coadd_size: usize,
) -> Vec<GridPoint> {
    let n = n_grid * n_grid;
    let dl = coadd_size as f64 / n_grid as f64;
    let dx: Vec<f64> = (0..n).map(|_| rng.gen_range(-0.5..0.5)).collect();
    let dy: Vec<f64> = (0..n).map(|_| rng.gen_range(-0.5..0.5)).collect();
    (0..n)
        .map(|i| {
            let (row, col) = ((i / n_grid) as f64, (i % n_grid) as f64);
            // grid is zero-offset, the WCS is one-offset
            let pos = Vec2D::new(
                col * dl + dl / 2.0 + 1.0 + dx[i],
                row * dl + dl / 2.0 + 1.0 + dy[i],
            );
            GridPoint {
                sky: coadd_wcs.image_to_sky(pos),
                pos,
            }
        })
        .collect()
}

/// fill in population rows and shapes for every grid point
pub fn make_truth_catalog<R: Rng + ?Sized>(
    rng: &mut R,
    grid: &[GridPoint],
    population: &GalaxyPopulation,
) -> Result<TruthCatalog> {
    let n = grid.len();
    let mut catalog: TruthCatalog = grid
        .iter()
        .enumerate()
        .map(|(i, point)| TruthRecord {
            number: i as i64 + 1,
            ind: 0,
            ra: point.sky.ra,
            dec: point.sky.dec,
            x: point.pos.x,
            y: point.pos.y,
            a_world: 0.0,
            b_world: 0.0,
            size: 0.0,
        })
        .collect();

    match population {
        GalaxyPopulation::Simple => {}
        GalaxyPopulation::VarSize(cat)
        | GalaxyPopulation::VarAng(cat)
        | GalaxyPopulation::VarSizeAng(cat) => {
            let high = n.min(cat.len());
            if high == 0 && n > 0 {
                return Err(SimError::Config("empty galaxy population".to_string()));
            }
            for rec in catalog.iter_mut() {
                let ind = rng.gen_range(0..high);
                // size = sqrt(a b), q = b / a
                rec.ind = ind as i64;
                rec.size = cat.size[ind];
                rec.a_world = cat.size[ind] / cat.q[ind].sqrt();
                rec.b_world = cat.size[ind] * cat.q[ind].sqrt();
            }
        }
        GalaxyPopulation::Descwl(cat) => {
            if cat.is_empty() && n > 0 {
                return Err(SimError::Config("empty descwl catalog".to_string()));
            }
            for rec in catalog.iter_mut() {
                let ind = rng.gen_range(0..cat.len());
                let row = cat.row(ind)?;
                rec.ind = ind as i64;
                rec.a_world = row.a_d;
                rec.b_world = row.b_d;
                rec.size = (row.a_d * row.b_d).sqrt();
            }
        }
    }
    Ok(catalog)
}

pub fn write_truth_catalog<P: AsRef<Path>>(path: P, catalog: &[TruthRecord]) -> Result<()> {
    write_table(path.as_ref(), catalog)?;
    info!(" wrote {} truth objects to {}", catalog.len(), path.as_ref().display());
    Ok(())
}

pub fn read_truth_catalog<P: AsRef<Path>>(path: P) -> Result<TruthCatalog> {
    read_table(path)
}
