/// median of a sample, averaging the middle pair for even lengths. NaNs are
/// ignored. Returns `None` for an empty sample.
pub fn median<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let mut vals: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
    if vals.is_empty() {
        return None;
    }
    vals.sort_by(|a, b| a.total_cmp(b));
    let mid = vals.len() / 2;
    if vals.len() % 2 == 0 {
        Some(0.5 * (vals[mid - 1] + vals[mid]))
    } else {
        Some(vals[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_and_even() {
        assert_eq!(median([3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median([4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(Vec::<f64>::new()), None);
        assert_eq!(median([f64::NAN, 5.0]), Some(5.0));
    }
}
