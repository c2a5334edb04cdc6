//! Renderable surface-brightness profiles.
//!
//! A [`Profile`] describes what to draw in sky coordinates (arcsec). It is a
//! plain value: building one never touches pixels, so sources can be built
//! lazily and in parallel and handed to any [`crate::draw::DrawKernel`].

use crate::{Moments, Shear};

/// ratio of half-light radius to sigma for a Gaussian
const GAUSS_HLR_PER_SIGMA: f64 = 1.177_410_022_515_474_7;

#[derive(Debug, Clone, PartialEq)]
pub enum Profile {
    Gaussian { sigma: f64, flux: f64 },
    Exponential { half_light_radius: f64, flux: f64 },
    DeVaucouleurs { half_light_radius: f64, flux: f64 },
    Sheared { inner: Box<Profile>, shear: Shear },
    Sum(Vec<Profile>),
    Convolution(Vec<Profile>),
}

impl Profile {
    pub fn gaussian_fwhm(fwhm: f64) -> Self {
        Profile::Gaussian {
            sigma: fwhm / (2.0 * (2.0 * 2f64.ln()).sqrt()),
            flux: 1.0,
        }
    }

    pub fn exponential(half_light_radius: f64) -> Self {
        Profile::Exponential {
            half_light_radius,
            flux: 1.0,
        }
    }

    pub fn de_vaucouleurs(half_light_radius: f64) -> Self {
        Profile::DeVaucouleurs {
            half_light_radius,
            flux: 1.0,
        }
    }

    pub fn flux(&self) -> f64 {
        match self {
            Profile::Gaussian { flux, .. }
            | Profile::Exponential { flux, .. }
            | Profile::DeVaucouleurs { flux, .. } => *flux,
            Profile::Sheared { inner, .. } => inner.flux(),
            Profile::Sum(parts) => parts.iter().map(Profile::flux).sum(),
            Profile::Convolution(parts) => parts.iter().map(Profile::flux).product(),
        }
    }

    fn scale_flux(self, factor: f64) -> Self {
        match self {
            Profile::Gaussian { sigma, flux } => Profile::Gaussian {
                sigma,
                flux: flux * factor,
            },
            Profile::Exponential {
                half_light_radius,
                flux,
            } => Profile::Exponential {
                half_light_radius,
                flux: flux * factor,
            },
            Profile::DeVaucouleurs {
                half_light_radius,
                flux,
            } => Profile::DeVaucouleurs {
                half_light_radius,
                flux: flux * factor,
            },
            Profile::Sheared { inner, shear } => Profile::Sheared {
                inner: Box::new(inner.scale_flux(factor)),
                shear,
            },
            Profile::Sum(parts) => {
                Profile::Sum(parts.into_iter().map(|p| p.scale_flux(factor)).collect())
            }
            Profile::Convolution(mut parts) => {
                if let Some(first) = parts.first_mut() {
                    *first = first.clone().scale_flux(factor);
                }
                Profile::Convolution(parts)
            }
        }
    }

    /// same shape, total flux set to `flux`
    pub fn with_flux(self, flux: f64) -> Self {
        let current = self.flux();
        if current == 0.0 {
            return self;
        }
        self.scale_flux(flux / current)
    }

    pub fn shear(self, shear: Shear) -> Self {
        Profile::Sheared {
            inner: Box::new(self),
            shear,
        }
    }

    pub fn convolve(parts: Vec<Profile>) -> Self {
        Profile::Convolution(parts)
    }

    /// Second moments per unit flux, arcsec^2. Radial profiles are treated as
    /// the Gaussian with the same half-light radius.
    pub fn second_moments(&self) -> Moments {
        match self {
            Profile::Gaussian { sigma, .. } => Moments::round(*sigma),
            Profile::Exponential {
                half_light_radius, ..
            }
            | Profile::DeVaucouleurs {
                half_light_radius, ..
            } => Moments::round(half_light_radius / GAUSS_HLR_PER_SIGMA),
            Profile::Sheared { inner, shear } => inner.second_moments().transform(shear.matrix()),
            Profile::Sum(parts) => {
                let total = self.flux();
                if total == 0.0 {
                    return Moments::round(0.0);
                }
                parts
                    .iter()
                    .map(|p| p.second_moments().scaled(p.flux() / total))
                    .fold(Moments::round(0.0), |a, b| a + b)
            }
            Profile::Convolution(parts) => parts
                .iter()
                .map(Profile::second_moments)
                .fold(Moments::round(0.0), |a, b| a + b),
        }
    }
}
