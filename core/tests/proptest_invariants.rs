use ndarray::{Array1, Array2};
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};
use shapeaudit_core::{
    calc_slopes, find_discontinuities_from_embeddings, find_non_monotonicities_from_embeddings,
    BayesOffline, ChangepointDetector, DiscontinuityOptions, FeatureFrame,
    NonMonotonicityOptions, ParallelSettings,
};

const MIN_PROPTEST_CASES: u32 = 128;
const PROB_TOL: f64 = 1e-9;

fn proptest_cases() -> u32 {
    std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .map(|parsed| parsed.max(MIN_PROPTEST_CASES))
        .unwrap_or(MIN_PROPTEST_CASES)
}

/// Sorted feature values drawn from a small integer grid, so ties are common.
fn sorted_x_strategy(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0_i32..20, 0..max_len).prop_map(|mut raw| {
        raw.sort_unstable();
        raw.into_iter().map(f64::from).collect()
    })
}

fn shape_case_strategy(max_len: usize) -> impl Strategy<Value = (Vec<f64>, Vec<f64>)> {
    sorted_x_strategy(max_len).prop_flat_map(|x| {
        let n = x.len();
        (Just(x), prop::collection::vec(-5.0_f64..5.0, n))
    })
}

fn sign_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(prop::bool::ANY, 0..max_len)
        .prop_map(|flags| flags.into_iter().map(|up| if up { 1.0 } else { -1.0 }).collect())
}

/// Raw features, integer-valued embeddings and binary outcomes for a small frame.
fn frame_case_strategy() -> impl Strategy<Value = (Array2<f64>, Array2<f64>, Array1<f64>)> {
    (4_usize..40, 1_usize..4).prop_flat_map(|(n, d)| {
        (
            prop::collection::vec(0_i32..15, n * d),
            prop::collection::vec(-4_i32..5, n * d),
            prop::collection::vec(prop::bool::ANY, n),
        )
            .prop_map(move |(raw, embedded, outcomes)| {
                let to_matrix = |values: Vec<i32>| {
                    Array2::from_shape_vec((n, d), values.into_iter().map(f64::from).collect())
                        .expect("generated matrix has n * d entries")
                };
                let y: Array1<f64> = outcomes
                    .into_iter()
                    .map(|positive| if positive { 1.0 } else { 0.0 })
                    .collect();
                (to_matrix(raw), to_matrix(embedded), y)
            })
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: proptest_cases(),
        max_shrink_iters: 1024,
        failure_persistence: Some(Box::new(FileFailurePersistence::Direct("proptest-regressions/tests/proptest_invariants.txt"))),
        .. ProptestConfig::default()
    })]

    #[test]
    fn slopes_have_one_entry_per_interval_and_are_finite((x, y) in shape_case_strategy(40)) {
        let slopes = calc_slopes(&Array1::from(x.clone()).view(), &Array1::from(y).view())
            .expect("lengths match");
        prop_assert_eq!(slopes.len(), x.len().saturating_sub(1));
        prop_assert!(slopes.iter().all(|slope| slope.is_finite()));
        for (i, slope) in slopes.iter().enumerate() {
            if x[i + 1] == x[i] {
                prop_assert_eq!(*slope, 0.0);
            }
        }
    }

    #[test]
    fn strictly_increasing_shapes_have_positive_slopes(
        steps in prop::collection::vec((0.1_f64..3.0, 0.1_f64..3.0), 1..30),
    ) {
        let mut x = vec![0.0];
        let mut y = vec![0.0];
        for (dx, dy) in steps {
            x.push(x[x.len() - 1] + dx);
            y.push(y[y.len() - 1] + dy);
        }
        let slopes = calc_slopes(&Array1::from(x).view(), &Array1::from(y).view())
            .expect("lengths match");
        prop_assert!(slopes.iter().all(|slope| *slope > 0.0));
    }

    #[test]
    fn changepoint_probabilities_are_bounded_and_deterministic(
        signs in sign_sequence_strategy(25),
        threshold in 0.0_f64..=1.0,
    ) {
        let detector = BayesOffline::default();
        let first = detector.changepoint_probabilities(&signs).expect("default prior is valid");
        let second = detector.changepoint_probabilities(&signs).expect("default prior is valid");
        prop_assert_eq!(first.len(), signs.len().saturating_sub(1));
        prop_assert_eq!(&first, &second);
        prop_assert!(first.iter().all(|p| (-PROB_TOL..=1.0 + PROB_TOL).contains(p)));

        let changepoints = detector.detect(&signs, threshold).expect("threshold in range");
        prop_assert!(changepoints.windows(2).all(|pair| pair[0] < pair[1]));
        prop_assert!(changepoints.iter().all(|&cp| cp >= 1 && cp < signs.len()));
    }

    #[test]
    fn monotone_shapes_have_no_non_monotonicities(n in 4_usize..30, rising in prop::bool::ANY) {
        let raw = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
        let embeddings = raw.mapv(|x| if rising { 0.5 * x } else { -0.5 * x });
        let frame = FeatureFrame::unnamed(raw).expect("finite values");
        let table = find_non_monotonicities_from_embeddings(
            &frame,
            &embeddings.view(),
            &BayesOffline::default(),
            &NonMonotonicityOptions::default(),
            ParallelSettings::sequential(),
        )
        .expect("valid inputs");
        prop_assert!(table.is_empty());
    }

    #[test]
    fn discontinuity_tables_are_ranked_and_respect_support(
        (raw, embeddings, y) in frame_case_strategy(),
        min_samples in 0_usize..6,
    ) {
        let frame = FeatureFrame::unnamed(raw).expect("finite values");
        let options = DiscontinuityOptions { min_samples };
        let sequential = find_discontinuities_from_embeddings(
            &frame,
            &embeddings.view(),
            &y.view(),
            &options,
            ParallelSettings::sequential(),
        )
        .expect("valid inputs");
        let parallel = find_discontinuities_from_embeddings(
            &frame,
            &embeddings.view(),
            &y.view(),
            &options,
            ParallelSettings::with_n_threads(3),
        )
        .expect("valid inputs");

        prop_assert_eq!(&sequential, &parallel);
        let p_ratios = sequential.p_ratios();
        prop_assert!(p_ratios.windows(2).all(|pair| pair[0] >= pair[1]));
        for row in sequential.iter() {
            prop_assert!(row.n_samples > min_samples);
            prop_assert!(row.p_ratio > 0.0);
            prop_assert!(row.effect_size >= 1.0);
        }
    }
}
