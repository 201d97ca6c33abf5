use proptest::prelude::*;
use tempestas::{HoldingTimeTable, SemiMarkovEngine, TransitionTable, ValidationError};

const NAMES: [&str; 5] = ["s0", "s1", "s2", "s3", "s4"];

/// Row-normalized random weights for `n` states.
fn tables(n: usize, raw: &[Vec<f64>], holding: &[i64]) -> (TransitionTable, HoldingTimeTable) {
    let transitions = (0..n)
        .map(|i| {
            let sum: f64 = raw[i][..n].iter().sum();
            let row = (0..n)
                .map(|j| (NAMES[j].to_string(), raw[i][j] / sum))
                .collect();
            (NAMES[i].to_string(), row)
        })
        .collect();
    let holding_times = (0..n)
        .map(|i| (NAMES[i].to_string(), holding[i]))
        .collect();
    (transitions, holding_times)
}

fn model_strategy() -> impl Strategy<Value = (usize, Vec<Vec<f64>>, Vec<i64>)> {
    (
        1usize..=5,
        prop::collection::vec(prop::collection::vec(0.01f64..10.0, 5), 5),
        prop::collection::vec(1i64..6, 5),
    )
}

proptest! {
    #[test]
    fn normalized_rows_are_accepted((n, raw, holding) in model_strategy(), seed in any::<u64>()) {
        let (transitions, holding_times) = tables(n, &raw, &holding);
        let engine = SemiMarkovEngine::starting_in(&transitions, &holding_times, "s0", Some(seed));
        prop_assert!(engine.is_ok());
    }

    #[test]
    fn scaled_row_is_rejected(
        (n, raw, holding) in model_strategy(),
        i_bad in 0usize..5,
        scale in prop_oneof![0.5f64..0.99, 1.01f64..2.0],
    ) {
        let (mut transitions, holding_times) = tables(n, &raw, &holding);
        let bad = NAMES[i_bad % n];
        transitions[bad].values_mut().for_each(|w| *w *= scale);

        let err = SemiMarkovEngine::starting_in(&transitions, &holding_times, "s0", Some(0))
            .unwrap_err();
        match err {
            ValidationError::ProbabilitiesDoNotSumToOne { state, sum } => {
                prop_assert_eq!(state, bad);
                prop_assert!((sum - scale).abs() < 1e-9);
            }
            other => prop_assert!(false, "unexpected error: {}", other),
        }
    }

    #[test]
    fn state_is_held_for_holding_time(
        (n, raw, holding) in model_strategy(),
        seed in any::<u64>(),
        n_changes in 1usize..20,
    ) {
        let (transitions, holding_times) = tables(n, &raw, &holding);
        let mut engine =
            SemiMarkovEngine::starting_in(&transitions, &holding_times, "s0", Some(seed)).unwrap();

        for _ in 0..n_changes {
            let state = engine.current_state().to_string();
            let ticks = holding_times[&state];
            for _ in 0..ticks - 1 {
                engine.advance_one_tick();
                prop_assert_eq!(engine.current_state(), state.as_str());
            }
            engine.advance_one_tick();
        }
    }

    #[test]
    fn report_sums_to_hundred(
        (n, raw, holding) in model_strategy(),
        seed in any::<u64>(),
        steps in 1u64..5_000,
    ) {
        let (transitions, holding_times) = tables(n, &raw, &holding);
        let mut engine =
            SemiMarkovEngine::starting_in(&transitions, &holding_times, "s0", Some(seed)).unwrap();

        let report = engine.run(steps);
        prop_assert_eq!(report.total(), steps);
        let sum: f64 = report.percentages.iter().sum();
        prop_assert!((sum - 100.0).abs() < 1e-6 * 100.0);
        prop_assert_eq!(&report.states[..], engine.states());
    }

    #[test]
    fn state_order_is_stable((n, raw, holding) in model_strategy(), seed in any::<u64>()) {
        let (transitions, holding_times) = tables(n, &raw, &holding);
        let mut engine =
            SemiMarkovEngine::starting_in(&transitions, &holding_times, "s0", Some(seed)).unwrap();

        let before = engine.states().to_vec();
        engine.run(100);
        prop_assert_eq!(engine.states(), &before[..]);
        prop_assert_eq!(&before[..], &NAMES[..n]);
    }
}
