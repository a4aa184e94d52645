//! Integration tests for the staircase session.
//!
//! Drives whole sessions through the public API:
//! - a noisy observer until every staircase terminates
//! - catch-trial rate over a long run
//! - catch trials never touching the staircase they borrow from

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use threshold_kernel::{
    ConditionConfig, KindTag, SelectionPolicy, SessionConfig, Side, StaircaseSession, StepType,
};

fn condition(label: &str, side: Side, kind: KindTag, start_val: f64) -> ConditionConfig {
    ConditionConfig {
        label: label.to_string(),
        side,
        kind,
        start_val,
        step_sizes: vec![0.5, 0.25],
        step_type: StepType::Linear,
        n_up: 1,
        n_down: 1,
        n_trials: 10,
        n_reversals: 6,
        min_val: 0.0,
        max_val: 1e6,
    }
}

fn four_conditions() -> Vec<ConditionConfig> {
    vec![
        condition("Unilateral-Left_0", Side::Left, KindTag::Unilateral, 5.0),
        condition("Unilateral-Right_0", Side::Right, KindTag::Unilateral, 5.0),
        condition("Unilateral-Left_1", Side::Left, KindTag::Unilateral, 6.0),
        condition("Unilateral-Right_1", Side::Right, KindTag::Unilateral, 6.0),
    ]
}

/// Snapshot of the fields a catch trial must not change.
fn fingerprint(session: &StaircaseSession) -> Vec<(f64, usize, usize, bool)> {
    session
        .staircases()
        .iter()
        .map(|s| {
            (
                s.intensity(),
                s.trials_presented(),
                s.reversal_intensities().len(),
                s.is_terminated(),
            )
        })
        .collect()
}

#[test]
fn test_session_runs_to_exhaustion() {
    let config = SessionConfig {
        selection: SelectionPolicy::Random,
        catch_probability: 0.25,
        catch_warmup_trials: 3,
        seed: Some(42),
    };
    let mut session = StaircaseSession::new(&four_conditions(), config).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    let mut staircase_trials = 0;
    let mut catch_trials = 0;
    loop {
        let trial = match session.next_trial() {
            Ok(trial) => trial,
            Err(e) => {
                assert!(e.is_exhausted(), "unexpected error: {e}");
                break;
            }
        };
        if trial.is_catch {
            catch_trials += 1;
            continue;
        }
        // higher intensity is easier; threshold near 3
        let p_correct = if trial.intensity > 3.0 { 0.9 } else { 0.3 };
        let correct = rng.random::<f64>() < p_correct;
        session.record_response(&trial.label, correct).unwrap();
        staircase_trials += 1;
        assert!(staircase_trials < 10_000, "session did not converge");
    }

    assert!(session.is_exhausted());
    assert_eq!(session.catch_trials(), catch_trials);
    assert_eq!(session.trials_issued(), staircase_trials + catch_trials);
    for s in session.staircases() {
        assert!(s.is_terminated());
        assert!(s.trials_presented() >= 10);
        assert!(s.reversal_intensities().len() >= 6);
        let threshold = s.threshold(3).unwrap();
        assert!(
            threshold > 1.0 && threshold < 6.5,
            "{} threshold {threshold} far from the observer's",
            s.label()
        );
    }
}

#[test]
fn test_catch_rate_converges_to_probability() {
    let p = 0.25;
    let warmup = 3;
    let config = SessionConfig {
        selection: SelectionPolicy::Sequential,
        catch_probability: p,
        catch_warmup_trials: warmup,
        seed: Some(2024),
    };
    let mut conditions = four_conditions();
    for c in &mut conditions {
        c.n_trials = u32::MAX;
    }
    let mut session = StaircaseSession::new(&conditions, config).unwrap();

    // warm-up: both sides get a history and the catch gate opens
    for _ in 0..warmup {
        let trial = session.next_trial().unwrap();
        assert!(!trial.is_catch);
        session.record_response(&trial.label, false).unwrap();
    }

    let draws = 10_000;
    let mut catches = 0;
    for i in 0..draws {
        let before = fingerprint(&session);
        let trial = session.next_trial().unwrap();
        if trial.is_catch {
            catches += 1;
            assert_eq!(before, fingerprint(&session), "catch trial {i} mutated a staircase");
        } else {
            session.record_response(&trial.label, i % 2 == 0).unwrap();
        }
    }

    let rate = catches as f64 / draws as f64;
    // five standard errors
    let tolerance = 5.0 * (p * (1.0 - p) / draws as f64).sqrt();
    assert!(
        (rate - p).abs() < tolerance,
        "catch rate {rate} outside {p} ± {tolerance}"
    );
}

#[test]
fn test_catch_intensity_comes_from_opposite_side() {
    let config = SessionConfig {
        selection: SelectionPolicy::Random,
        catch_probability: 0.5,
        catch_warmup_trials: 0,
        seed: Some(9),
    };
    let mut conditions = four_conditions();
    for c in &mut conditions {
        c.n_trials = u32::MAX;
    }
    let mut session = StaircaseSession::new(&conditions, config).unwrap();

    let mut checked = 0;
    for i in 0..500 {
        let last_left = session.side_history(Side::Left).last().copied();
        let last_right = session.side_history(Side::Right).last().copied();

        let trial = session.next_trial().unwrap();
        if trial.is_catch {
            let expected = match trial.side {
                Side::Left => last_right,
                Side::Right => last_left,
            };
            assert_eq!(Some(trial.intensity), expected);
            checked += 1;
        } else {
            session.record_response(&trial.label, i % 3 != 0).unwrap();
        }
    }
    assert!(checked > 50, "too few catch trials exercised: {checked}");
}

#[test]
fn test_bilateral_conditions_carry_their_kind() {
    let conditions = vec![
        condition("Bilateral-Left_0", Side::Left, KindTag::Bilateral, 2.5),
        condition("Bilateral-Right_0", Side::Right, KindTag::Bilateral, 4.0),
    ];
    let mut session = StaircaseSession::new(
        &conditions,
        SessionConfig {
            selection: SelectionPolicy::Sequential,
            catch_probability: 0.0,
            catch_warmup_trials: 0,
            seed: Some(1),
        },
    )
    .unwrap();
    let trial = session.next_trial().unwrap();
    assert_eq!(trial.kind, threshold_kernel::ConditionKind::Bilateral);
    assert_eq!(trial.side, Side::Left);
    assert_eq!(trial.intensity, 2.5);
}
