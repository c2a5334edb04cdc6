use std::ops::{Add, AddAssign, Mul, Sub};

use serde::{Deserialize, Serialize};

/// a position in image coordinates, or any other 2D offset
#[derive(Clone, Debug, Copy, Deserialize, PartialEq, Serialize)]
pub struct Vec2D {
    pub x: f64,
    pub y: f64,
}

impl Vec2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn dot(&self, other: &Vec2D) -> f64 {
        self.x * other.x + self.y * other.y
    }
}

impl AddAssign for Vec2D {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}
impl Add for Vec2D {
    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
    type Output = Self;
}
impl Sub for Vec2D {
    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
    type Output = Self;
}

impl Mul<f64> for Vec2D {
    fn mul(self, rhs: f64) -> Self::Output {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
    type Output = Self;
}

/// celestial position, degrees
#[derive(Clone, Debug, Copy, Deserialize, PartialEq, Serialize)]
pub struct SkyCoord {
    pub ra: f64,
    pub dec: f64,
}

impl SkyCoord {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }
}

/// local linear map from pixel offsets (col, row) to sky offsets (u, v) in
/// arcsec, centered on (row0, col0)
#[derive(Clone, Debug, Copy, Deserialize, PartialEq, Serialize)]
pub struct Jacobian {
    pub row0: f64,
    pub col0: f64,
    pub dudcol: f64,
    pub dudrow: f64,
    pub dvdcol: f64,
    pub dvdrow: f64,
}

impl Jacobian {
    pub fn from_scale(scale: f64, row0: f64, col0: f64) -> Self {
        Self {
            row0,
            col0,
            dudcol: scale,
            dudrow: 0.0,
            dvdcol: 0.0,
            dvdrow: scale,
        }
    }

    pub fn det(&self) -> f64 {
        self.dudcol * self.dvdrow - self.dudrow * self.dvdcol
    }

    /// linear pixel scale, sqrt(|det|)
    pub fn get_scale(&self) -> f64 {
        self.det().abs().sqrt()
    }

    /// sky offset of pixel (row, col) from the jacobian center
    pub fn get_uv(&self, row: f64, col: f64) -> Vec2D {
        let drow = row - self.row0;
        let dcol = col - self.col0;
        Vec2D {
            x: self.dudcol * dcol + self.dudrow * drow,
            y: self.dvdcol * dcol + self.dvdrow * drow,
        }
    }

    /// same jacobian recentered on a new origin
    pub fn with_center(&self, row0: f64, col0: f64) -> Self {
        Self { row0, col0, ..*self }
    }
}

/// reduced shear (g1, g2)
#[derive(Clone, Debug, Copy, Deserialize, PartialEq, Serialize)]
pub struct Shear {
    pub g1: f64,
    pub g2: f64,
}

impl Shear {
    pub fn new(g1: f64, g2: f64) -> Self {
        Self { g1, g2 }
    }

    /// shear of an ellipse with axis ratio `q` whose major axis sits at
    /// `beta_deg` degrees
    pub fn from_q_beta(q: f64, beta_deg: f64) -> Self {
        let g = (1.0 - q) / (1.0 + q);
        let two_beta = 2.0 * beta_deg.to_radians();
        Self {
            g1: g * two_beta.cos(),
            g2: g * two_beta.sin(),
        }
    }

    pub fn g(&self) -> f64 {
        self.g1.hypot(self.g2)
    }

    /// area-preserving distortion matrix for this shear
    pub fn matrix(&self) -> [[f64; 2]; 2] {
        let norm = 1.0 / (1.0 - self.g() * self.g()).sqrt();
        [
            [norm * (1.0 + self.g1), norm * self.g2],
            [norm * self.g2, norm * (1.0 - self.g1)],
        ]
    }
}

/// symmetric second-moment matrix [[xx, xy], [xy, yy]]
#[derive(Clone, Debug, Copy, PartialEq)]
pub struct Moments {
    pub xx: f64,
    pub xy: f64,
    pub yy: f64,
}

impl Moments {
    pub fn round(sigma: f64) -> Self {
        let s2 = sigma * sigma;
        Self { xx: s2, xy: 0.0, yy: s2 }
    }

    pub fn det(&self) -> f64 {
        self.xx * self.yy - self.xy * self.xy
    }

    /// M' = A M A^T
    pub fn transform(&self, a: [[f64; 2]; 2]) -> Self {
        let m = [[self.xx, self.xy], [self.xy, self.yy]];
        let mut out = [[0.0; 2]; 2];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, val) in row.iter_mut().enumerate() {
                *val = (0..2)
                    .flat_map(|k| (0..2).map(move |l| (k, l)))
                    .map(|(k, l)| a[i][k] * m[k][l] * a[j][l])
                    .sum();
            }
        }
        Self {
            xx: out[0][0],
            xy: 0.5 * (out[0][1] + out[1][0]),
            yy: out[1][1],
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            xx: self.xx * factor,
            xy: self.xy * factor,
            yy: self.yy * factor,
        }
    }
}

impl Add for Moments {
    fn add(self, rhs: Self) -> Self::Output {
        Self {
            xx: self.xx + rhs.xx,
            xy: self.xy + rhs.xy,
            yy: self.yy + rhs.yy,
        }
    }
    type Output = Self;
}
