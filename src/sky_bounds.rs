//! Approximate footprint of an image on the sky.

use crate::wcs::{radec_to_uv, Wcs};
use crate::{SkyCoord, Vec2D};

/// Polygon in the tangent plane about an image center (arcsec), grown by
/// `buffer`.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyBounds {
    pub vertices: Vec<Vec2D>,
    pub buffer: f64,
}

fn segment_distance(p: Vec2D, a: Vec2D, b: Vec2D) -> f64 {
    let ab = b - a;
    let len2 = ab.dot(&ab);
    if len2 == 0.0 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

impl SkyBounds {
    fn edges(&self) -> impl Iterator<Item = (Vec2D, Vec2D)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    fn inside_polygon(&self, p: Vec2D) -> bool {
        // even-odd ray cast along +x
        self.edges()
            .filter(|(a, b)| {
                (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x
            })
            .count()
            % 2
            == 1
    }

    pub fn contains(&self, uv: Vec2D) -> bool {
        if self.vertices.len() < 3 {
            return false;
        }
        self.inside_polygon(uv) || self.edges().any(|(a, b)| segment_distance(uv, a, b) <= self.buffer)
    }

    pub fn contains_sky(&self, sky: SkyCoord, center: SkyCoord) -> bool {
        radec_to_uv(sky, center).is_some_and(|uv| self.contains(uv))
    }
}

/// Walk the outer pixel edges of an `im_shape` (rows, cols) image with
/// `n_grid` points per side and project them about the image center.
/// `position_offset` converts array indices to the WCS pixel convention.
pub fn get_rough_sky_bounds(
    im_shape: [usize; 2],
    wcs: &dyn Wcs,
    position_offset: f64,
    bounds_buffer_uv: f64,
    n_grid: usize,
) -> (SkyBounds, SkyCoord) {
    let (nrow, ncol) = (im_shape[0] as f64, im_shape[1] as f64);
    let center = wcs.image_to_sky(Vec2D::new(
        (ncol - 1.0) / 2.0 + position_offset,
        (nrow - 1.0) / 2.0 + position_offset,
    ));

    let n = n_grid.max(2);
    let steps = |lo: f64, hi: f64| -> Vec<f64> {
        (0..n - 1)
            .map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64)
            .collect()
    };
    let (x0, x1) = (-0.5, ncol - 0.5);
    let (y0, y1) = (-0.5, nrow - 0.5);

    // counter-clockwise in array coordinates
    let mut perimeter: Vec<(f64, f64)> = vec![];
    perimeter.extend(steps(x0, x1).into_iter().map(|x| (x, y0)));
    perimeter.extend(steps(y0, y1).into_iter().map(|y| (x1, y)));
    perimeter.extend(steps(x1, x0).into_iter().map(|x| (x, y1)));
    perimeter.extend(steps(y1, y0).into_iter().map(|y| (x0, y)));

    let vertices = perimeter
        .into_iter()
        .filter_map(|(x, y)| {
            let sky = wcs.image_to_sky(Vec2D::new(x + position_offset, y + position_offset));
            radec_to_uv(sky, center)
        })
        .collect();
    (
        SkyBounds {
            vertices,
            buffer: bounds_buffer_uv,
        },
        center,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wcs::TanWcs;

    fn square() -> SkyBounds {
        SkyBounds {
            vertices: vec![
                Vec2D::new(0.0, 0.0),
                Vec2D::new(10.0, 0.0),
                Vec2D::new(10.0, 10.0),
                Vec2D::new(0.0, 10.0),
            ],
            buffer: 1.0,
        }
    }

    #[test]
    fn buffer_grows_the_polygon() {
        let bounds = square();
        assert!(bounds.contains(Vec2D::new(5.0, 5.0)));
        assert!(bounds.contains(Vec2D::new(10.9, 5.0)));
        assert!(bounds.contains(Vec2D::new(-0.5, -0.5)));
        assert!(!bounds.contains(Vec2D::new(11.5, 5.0)));
        assert!(!bounds.contains(Vec2D::new(-0.8, -0.8)));
    }

    #[test]
    fn image_footprint() {
        let wcs = TanWcs::simple(SkyCoord::new(30.0, -30.0), Vec2D::new(1024.5, 2048.5), 0.263).unwrap();
        let (bounds, center) = get_rough_sky_bounds([4096, 2048], &wcs, 1.0, 128.0 * 0.263, 4);
        assert_eq!(bounds.vertices.len(), 12);
        let inside = wcs.image_to_sky(Vec2D::new(3.0, 4000.0));
        assert!(bounds.contains_sky(inside, center));
        // 100 pixels off the edge is within the 128 pixel buffer
        let near = wcs.image_to_sky(Vec2D::new(-100.0, 2000.0));
        assert!(bounds.contains_sky(near, center));
        let far = wcs.image_to_sky(Vec2D::new(-200.0, 2000.0));
        assert!(!bounds.contains_sky(far, center));
    }
}
