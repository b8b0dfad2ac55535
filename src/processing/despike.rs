//! Spike removal for short sensor traces.

/// Median-of-three filter with edge replication.
///
/// Each output point is the median of the point and its two neighbours, the ends
/// being padded with copies of themselves. An isolated one-sample outlier in the
/// interior is replaced by a neighbouring value while a step that lasts two samples
/// or more passes unchanged. The output has the same length as the input.
pub fn despike(trace: &[f64]) -> Vec<f64> {
    let n = trace.len();
    if n < 3 {
        return trace.to_vec();
    }
    (0..n)
        .map(|i| {
            let prev = trace[i.saturating_sub(1)];
            let next = trace[(i + 1).min(n - 1)];
            median3(prev, trace[i], next)
        })
        .collect()
}

fn median3(a: f64, b: f64, c: f64) -> f64 {
    a.max(b).min(a.min(b).max(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_isolated_spike() {
        assert_eq!(
            despike(&[1.0, 1.0, 50.0, 1.0, 1.0]),
            vec![1.0, 1.0, 1.0, 1.0, 1.0]
        );
        assert_eq!(despike(&[0.0, -40.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn keeps_sustained_step_in_place() {
        let step = [0.0, 0.0, 0.0, 10.0, 10.0, 10.0];
        assert_eq!(despike(&step), step.to_vec());
    }

    #[test]
    fn preserves_length() {
        for n in 0..8 {
            let trace: Vec<f64> = (0..n).map(|i| (i * i) as f64).collect();
            assert_eq!(despike(&trace).len(), n);
        }
    }

    #[test]
    fn short_traces_pass_through() {
        assert_eq!(despike(&[3.0, 90.0]), vec![3.0, 90.0]);
        assert!(despike(&[]).is_empty());
    }

    #[test]
    fn median_of_three() {
        assert_eq!(median3(1.0, 2.0, 3.0), 2.0);
        assert_eq!(median3(3.0, 1.0, 2.0), 2.0);
        assert_eq!(median3(2.0, 3.0, 1.0), 2.0);
        assert_eq!(median3(5.0, 5.0, 1.0), 5.0);
    }
}
