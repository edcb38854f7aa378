use std::ops::Range;

use crate::tracking::algebra::subtract_vector;
use crate::tracking::Vector;

/// Per-step residuals `estimate_k - truth_k`.
pub fn estimation_errors(estimates: &[Vector], trajectory: &[Vector]) -> Vec<Vector> {
    assert_eq!(estimates.len(), trajectory.len(), "series lengths differ");
    estimates
        .iter()
        .zip(trajectory.iter())
        .map(|(estimate, truth)| subtract_vector(estimate, truth))
        .collect()
}

/// Series of one state component.
pub fn component(series: &[Vector], index: usize) -> Vec<f64> {
    series.iter().map(|state| state[index]).collect()
}

/// Mean of `|error_k[index]|` over `steps`; `None` for an empty range.
pub fn mean_absolute_error(errors: &[Vector], index: usize, steps: Range<usize>) -> Option<f64> {
    let window = errors.get(steps)?;
    if window.is_empty() {
        return None;
    }
    let total: f64 = window.iter().map(|error| error[index].abs()).sum();
    Some(total / window.len() as f64)
}

pub fn root_mean_square_error(errors: &[Vector], index: usize) -> Option<f64> {
    if errors.is_empty() {
        return None;
    }
    let total: f64 = errors.iter().map(|error| error[index] * error[index]).sum();
    Some((total / errors.len() as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_estimation_errors() {
        let estimates = vec![array![1.0, 2.0], array![3.5, -1.0]];
        let trajectory = vec![array![0.5, 2.0], array![4.0, 1.0]];

        let errors = estimation_errors(&estimates, &trajectory);
        assert_eq!(errors, vec![array![0.5, 0.0], array![-0.5, -2.0]]);
        assert_eq!(component(&errors, 1), vec![0.0, -2.0]);
    }

    #[test]
    fn test_error_statistics() {
        let errors = vec![array![1.0], array![-3.0], array![2.0], array![-2.0]];

        assert_eq!(mean_absolute_error(&errors, 0, 0..2), Some(2.0));
        assert_eq!(mean_absolute_error(&errors, 0, 2..4), Some(2.0));
        assert_eq!(mean_absolute_error(&errors, 0, 0..4), Some(2.0));
        assert_eq!(mean_absolute_error(&errors, 0, 2..2), None);
        assert_eq!(mean_absolute_error(&errors, 0, 3..9), None);
        assert_eq!(root_mean_square_error(&errors, 0), Some((18.0_f64 / 4.0).sqrt()));
        assert_eq!(root_mean_square_error(&[], 0), None);
    }
}
