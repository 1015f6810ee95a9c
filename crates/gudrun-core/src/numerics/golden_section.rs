pub const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;

/// Golden-section minimisation over a `[lo, mid, hi]` bracket.
///
/// Each step probes `d = mid + (2 - φ)(hi - mid)`. When `f(d) < f(mid)` the
/// next bracket is `[mid, d, hi]`, otherwise it is the reversed
/// `[d, mid, lo]`; ties take the second branch. The search stops with `mid`
/// after `max_iterations` steps, or with `(hi + mid) / 2` once the relative
/// bracket width drops below `(rtol / 100)²`. A cost evaluation returning
/// `None` aborts the whole search.
pub fn golden_section_search<F>(
    mut cost: F,
    bracket: [f64; 3],
    start: usize,
    max_iterations: usize,
    rtol: f64,
) -> Option<f64>
where
    F: FnMut(f64) -> Option<f64>,
{
    let [mut lo, mut mid, mut hi] = bracket;
    let tolerance = (rtol / 100.0).powi(2);
    let mut iteration = start;

    loop {
        if iteration >= max_iterations {
            return Some(mid);
        }
        if (hi - lo).abs() / lo.abs().min(hi.abs()) < tolerance {
            return Some((hi + mid) / 2.0);
        }

        let probe = mid + (2.0 - GOLDEN_RATIO) * (hi - mid);
        let probe_cost = cost(probe)?;
        let mid_cost = cost(mid)?;
        tracing::debug!(iteration, lo, mid, hi, probe, probe_cost, mid_cost, "golden-section step");

        if probe_cost < mid_cost {
            [lo, mid, hi] = [mid, probe, hi];
        } else {
            [lo, mid, hi] = [probe, mid, lo];
        }
        iteration += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::golden_section_search;

    #[test]
    fn converges_on_quadratic_minimum_within_tolerance() {
        for target in [0.05, 0.5, 2.0, 7.3] {
            let found = golden_section_search(
                |x| Some((x - target) * (x - target)),
                [1e-2, 1.0, 10.0],
                0,
                100,
                1.0,
            )
            .expect("search should converge");
            assert!(
                ((found - target) / target).abs() < 0.01,
                "target {target} found {found}"
            );
        }
    }

    #[test]
    fn zero_iterations_returns_initial_midpoint() {
        let mut calls = 0;
        let found = golden_section_search(
            |x| {
                calls += 1;
                Some(x)
            },
            [1e-2, 1.5, 10.0],
            0,
            0,
            1.0,
        );
        assert_eq!(found, Some(1.5));
        assert_eq!(calls, 0);
    }

    #[test]
    fn narrow_bracket_returns_upper_midpoint_without_evaluating() {
        let mut calls = 0;
        let found = golden_section_search(
            |x| {
                calls += 1;
                Some(x)
            },
            [2.0, 2.0001, 2.0002],
            0,
            100,
            1.0,
        )
        .expect("bracket is already within tolerance");
        assert!((found - 2.00015).abs() < 1e-12);
        assert_eq!(calls, 0);
    }

    #[test]
    fn failed_evaluation_aborts_the_search() {
        let mut calls = 0;
        let found = golden_section_search(
            |x| {
                calls += 1;
                (calls < 5).then_some(x * x)
            },
            [1e-2, 1.0, 10.0],
            0,
            100,
            1.0,
        );
        assert_eq!(found, None);
        assert_eq!(calls, 5);
    }

    #[test]
    fn ties_take_the_reversed_bracket() {
        let mut probes = Vec::new();
        let _ = golden_section_search(
            |x| {
                probes.push(x);
                Some(0.0)
            },
            [1.0, 2.0, 4.0],
            0,
            2,
            1.0,
        );
        let first = 2.0 + (2.0 - super::GOLDEN_RATIO) * 2.0;
        let second = 2.0 + (2.0 - super::GOLDEN_RATIO) * (1.0 - 2.0);
        assert_eq!(probes, vec![first, 2.0, second, 2.0]);
    }
}
