//! Pixel <-> sky mappings.
//!
//! Image positions follow the FITS convention: the center of the first
//! pixel is (1, 1). Sky positions are in degrees.

use std::path::Path;

use fitsio::FitsFile;

use crate::io::header_f64;
use crate::{Jacobian, Result, SimError, SkyCoord, Vec2D};

const ARCSEC_PER_RAD: f64 = 180.0 * 3600.0 / std::f64::consts::PI;

pub trait Wcs: Send + Sync {
    fn sky_to_image(&self, sky: SkyCoord) -> Option<Vec2D>;
    fn image_to_sky(&self, pos: Vec2D) -> SkyCoord;

    /// local jacobian at an image position, in arcsec per pixel. The returned
    /// jacobian is centered on the 0-offset array index of `pos`.
    fn local_jacobian(&self, pos: Vec2D) -> Jacobian {
        let sky0 = self.image_to_sky(pos);
        let uv = |dx: f64, dy: f64| {
            let sky = self.image_to_sky(Vec2D::new(pos.x + dx, pos.y + dy));
            radec_to_uv(sky, sky0).unwrap_or(Vec2D::new(0.0, 0.0))
        };
        let (xp, xm) = (uv(0.5, 0.0), uv(-0.5, 0.0));
        let (yp, ym) = (uv(0.0, 0.5), uv(0.0, -0.5));
        Jacobian {
            row0: pos.y - 1.0,
            col0: pos.x - 1.0,
            dudcol: xp.x - xm.x,
            dudrow: yp.x - ym.x,
            dvdcol: xp.y - xm.y,
            dvdrow: yp.y - ym.y,
        }
    }
}

/// Gnomonic (TAN) projection. Returns tangent-plane coordinates in radians, or
/// `None` when the point is on the far side of the tangent plane.
pub fn tan_project(ra: f64, dec: f64, crval_ra: f64, crval_dec: f64) -> Option<(f64, f64)> {
    let da = ra - crval_ra;
    let (sin_dec, cos_dec) = dec.sin_cos();
    let (sin_dec0, cos_dec0) = crval_dec.sin_cos();
    let cos_da = da.cos();

    let denom = sin_dec * sin_dec0 + cos_dec * cos_dec0 * cos_da;
    if denom <= 1e-12 {
        return None;
    }
    let xi = cos_dec * da.sin() / denom;
    let eta = (sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_da) / denom;
    Some((xi, eta))
}

/// Inverse gnomonic projection, radians in and out.
pub fn inverse_tan_project(xi: f64, eta: f64, crval_ra: f64, crval_dec: f64) -> (f64, f64) {
    let (sin_dec0, cos_dec0) = crval_dec.sin_cos();
    let rho_sq = xi * xi + eta * eta;
    if rho_sq < 1e-30 {
        return (crval_ra, crval_dec);
    }
    let rho = rho_sq.sqrt();
    let c = rho.atan();
    let (sin_c, cos_c) = c.sin_cos();

    let dec = (cos_c * sin_dec0 + eta * sin_c * cos_dec0 / rho).asin();
    let ra = crval_ra + (xi * sin_c).atan2(rho * cos_dec0 * cos_c - eta * sin_dec0 * sin_c);
    (ra, dec)
}

/// tangent-plane offset of `sky` about `center`, in arcsec. `u` grows towards
/// decreasing RA so that a north-up, east-left image has positive dudcol.
pub fn radec_to_uv(sky: SkyCoord, center: SkyCoord) -> Option<Vec2D> {
    let (xi, eta) = tan_project(
        sky.ra.to_radians(),
        sky.dec.to_radians(),
        center.ra.to_radians(),
        center.dec.to_radians(),
    )?;
    Some(Vec2D::new(-xi * ARCSEC_PER_RAD, eta * ARCSEC_PER_RAD))
}

/// TAN WCS with a CD matrix in degrees per pixel
#[derive(Debug, Clone, PartialEq)]
pub struct TanWcs {
    pub crval: SkyCoord,
    pub crpix: Vec2D,
    pub cd: [[f64; 2]; 2],
    cd_inv: [[f64; 2]; 2],
}

impl TanWcs {
    pub fn new(crval: SkyCoord, crpix: Vec2D, cd: [[f64; 2]; 2]) -> Result<Self> {
        let det = cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0];
        if det.abs() < 1e-30 {
            return Err(SimError::InvalidFITS("singular CD matrix".to_string()));
        }
        let inv_det = 1.0 / det;
        let cd_inv = [
            [cd[1][1] * inv_det, -cd[0][1] * inv_det],
            [-cd[1][0] * inv_det, cd[0][0] * inv_det],
        ];
        Ok(Self { crval, crpix, cd, cd_inv })
    }

    /// north-up, east-left WCS with a square pixel `scale` in arcsec
    pub fn simple(crval: SkyCoord, crpix: Vec2D, scale: f64) -> Result<Self> {
        let deg = scale / 3600.0;
        Self::new(crval, crpix, [[-deg, 0.0], [0.0, deg]])
    }

    /// read the WCS keywords of HDU `ext` of a FITS file
    pub fn from_fits<P: AsRef<Path>>(path: P, ext: usize) -> Result<Self> {
        let filename = path.as_ref().display().to_string();
        let mut fptr = FitsFile::open(path.as_ref())?;
        let hdu = fptr.hdu(ext).map_err(|_| {
            SimError::InvalidFITS(format!("no HDU {} in {}", ext, filename))
        })?;
        let mut key = |name: &str| header_f64(&mut fptr, &hdu, name, &filename);
        let crval = SkyCoord::new(key("CRVAL1")?, key("CRVAL2")?);
        let crpix = Vec2D::new(key("CRPIX1")?, key("CRPIX2")?);
        let cd = match key("CD1_1") {
            Ok(cd11) => [
                [cd11, key("CD1_2").unwrap_or(0.0)],
                [key("CD2_1").unwrap_or(0.0), key("CD2_2")?],
            ],
            // no CD matrix, fall back to an unrotated CDELT
            Err(_) => [[key("CDELT1")?, 0.0], [0.0, key("CDELT2")?]],
        };
        Self::new(crval, crpix, cd)
    }
}

impl Wcs for TanWcs {
    fn sky_to_image(&self, sky: SkyCoord) -> Option<Vec2D> {
        let (xi, eta) = tan_project(
            sky.ra.to_radians(),
            sky.dec.to_radians(),
            self.crval.ra.to_radians(),
            self.crval.dec.to_radians(),
        )?;
        let (xi, eta) = (xi.to_degrees(), eta.to_degrees());
        Some(Vec2D {
            x: self.cd_inv[0][0] * xi + self.cd_inv[0][1] * eta + self.crpix.x,
            y: self.cd_inv[1][0] * xi + self.cd_inv[1][1] * eta + self.crpix.y,
        })
    }

    fn image_to_sky(&self, pos: Vec2D) -> SkyCoord {
        let d = pos - self.crpix;
        let xi = (self.cd[0][0] * d.x + self.cd[0][1] * d.y).to_radians();
        let eta = (self.cd[1][0] * d.x + self.cd[1][1] * d.y).to_radians();
        let (ra, dec) = inverse_tan_project(
            xi,
            eta,
            self.crval.ra.to_radians(),
            self.crval.dec.to_radians(),
        );
        SkyCoord::new(ra.to_degrees().rem_euclid(360.0), dec.to_degrees())
    }
}
