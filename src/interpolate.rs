use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Fill masked pixels of `image` from nearby good pixels.
///
/// Each bad pixel becomes the inverse-distance-weighted mean of the good
/// pixels within `buff` pixels of it. Returns `None` when more than `maxfrac`
/// of the image is masked, or when a bad pixel has no good neighbour in range
/// and `fill_isolated_with_noise` is off. Isolated pixels are otherwise drawn
/// from N(0, 1/sqrt(weight)).
pub fn interpolate_image_at_mask<R: Rng + ?Sized>(
    image: &Array2<f64>,
    weight: f64,
    bad_msk: &Array2<bool>,
    rng: &mut R,
    maxfrac: f64,
    buff: usize,
    fill_isolated_with_noise: bool,
) -> Option<Array2<f64>> {
    let nbad = bad_msk.iter().filter(|bad| **bad).count();
    if nbad == 0 {
        return Some(image.clone());
    }
    if nbad as f64 / bad_msk.len() as f64 > maxfrac {
        return None;
    }
    let noise = if fill_isolated_with_noise && weight > 0.0 {
        Normal::new(0.0, 1.0 / weight.sqrt()).ok()
    } else {
        None
    };

    let (nrow, ncol) = image.dim();
    let reach = buff as isize;
    let mut out = image.clone();
    for ((row, col), _) in bad_msk.indexed_iter().filter(|(_, bad)| **bad) {
        let (mut sum, mut wsum) = (0.0, 0.0);
        for dr in -reach..=reach {
            for dc in -reach..=reach {
                let (r, c) = (row as isize + dr, col as isize + dc);
                if r < 0 || c < 0 || r >= nrow as isize || c >= ncol as isize {
                    continue;
                }
                let dist2 = (dr * dr + dc * dc) as f64;
                if dist2 > (reach * reach) as f64 || bad_msk[[r as usize, c as usize]] {
                    continue;
                }
                let w = 1.0 / dist2;
                sum += w * image[[r as usize, c as usize]];
                wsum += w;
            }
        }
        out[[row, col]] = if wsum > 0.0 {
            sum / wsum
        } else {
            match noise {
                Some(dist) => dist.sample(rng),
                None => return None,
            }
        };
    }
    Some(out)
}
