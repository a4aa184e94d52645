//! Interleaved staircase session with catch-trial injection.
//!
//! The session owns every staircase for a run. `next_trial` picks the next
//! staircase according to the selection policy and, once warmed up, may
//! replace it with a catch trial that borrows the most recent intensity of
//! the opposite side. A staircase trial that was displaced by a catch stays
//! pending and is offered again on the following call.

use std::collections::{HashSet, VecDeque};

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ConditionConfig, ConditionKind, SelectionPolicy, SessionConfig, Side};
use crate::error::{KernelError, Result};
use crate::staircase::{Staircase, StepResult};

/// A trial handed to the caller for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// Label of the staircase this trial belongs to
    pub label: String,
    /// Side the subject reports on
    pub side: Side,
    pub kind: ConditionKind,
    pub intensity: f64,
    /// Catch trials are logged only and never reach a staircase
    pub is_catch: bool,
}

/// Owns the staircase pool for one run.
#[derive(Debug)]
pub struct StaircaseSession {
    config: SessionConfig,
    /// All staircases in configuration order, terminated ones included
    staircases: Vec<Staircase>,
    /// Indices still in the current pass
    queue: VecDeque<usize>,
    /// Staircase trial drawn but not yet answered
    pending: Option<usize>,
    /// Intensities drawn per side, most recent last
    left_history: Vec<f64>,
    right_history: Vec<f64>,
    trials_issued: usize,
    catch_trials: usize,
    rng: ChaCha8Rng,
}

impl StaircaseSession {
    /// Build a session from condition descriptors.
    ///
    /// Labels must be unique and every descriptor valid.
    pub fn new(conditions: &[ConditionConfig], config: SessionConfig) -> Result<Self> {
        config.validate()?;
        if conditions.is_empty() {
            return Err(KernelError::invalid("session needs at least one condition"));
        }

        let mut seen = HashSet::new();
        let mut staircases = Vec::with_capacity(conditions.len());
        for condition in conditions {
            if !seen.insert(condition.label.as_str()) {
                return Err(KernelError::invalid(format!(
                    "duplicate condition label {}",
                    condition.label
                )));
            }
            staircases.push(Staircase::new(condition)?);
        }

        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        debug!(
            conditions = staircases.len(),
            selection = config.selection.name(),
            seed,
            "Staircase session created"
        );

        Ok(Self {
            config,
            staircases,
            queue: VecDeque::new(),
            pending: None,
            left_history: Vec::new(),
            right_history: Vec::new(),
            trials_issued: 0,
            catch_trials: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Every staircase in configuration order.
    pub fn staircases(&self) -> &[Staircase] {
        &self.staircases
    }

    pub fn staircase(&self, label: &str) -> Option<&Staircase> {
        self.staircases.iter().find(|s| s.label() == label)
    }

    /// Labels of staircases that have not terminated yet.
    pub fn active_labels(&self) -> Vec<&str> {
        self.staircases
            .iter()
            .filter(|s| !s.is_terminated())
            .map(|s| s.label())
            .collect()
    }

    pub fn is_exhausted(&self) -> bool {
        self.staircases.iter().all(|s| s.is_terminated())
    }

    /// Trials handed out so far, catch trials included.
    pub fn trials_issued(&self) -> usize {
        self.trials_issued
    }

    pub fn catch_trials(&self) -> usize {
        self.catch_trials
    }

    /// Intensities drawn for `side`, most recent last.
    pub fn side_history(&self, side: Side) -> &[f64] {
        match side {
            Side::Left => &self.left_history,
            Side::Right => &self.right_history,
        }
    }

    /// The staircase trial waiting for a response, if any.
    pub fn pending_label(&self) -> Option<&str> {
        self.pending.map(|i| self.staircases[i].label())
    }

    /// Next trial to present.
    ///
    /// Returns `StaircaseExhausted` once every staircase has terminated.
    pub fn next_trial(&mut self) -> Result<Trial> {
        if self.is_exhausted() {
            return Err(KernelError::StaircaseExhausted);
        }

        let index = match self.pending {
            Some(index) => index,
            None => {
                let index = self.select()?;
                self.pending = Some(index);
                index
            }
        };

        let staircase = &self.staircases[index];
        let side = staircase.side();
        let intensity = staircase.intensity();
        match side {
            Side::Left => self.left_history.push(intensity),
            Side::Right => self.right_history.push(intensity),
        }

        let catch_intensity = if self.trials_issued >= self.config.catch_warmup_trials {
            let borrowed = self.side_history(side.opposite()).last().copied();
            // always draw so the catch sequence does not depend on history
            let roll: f64 = self.rng.random();
            borrowed.filter(|_| roll < self.config.catch_probability)
        } else {
            None
        };
        self.trials_issued += 1;

        let staircase = &self.staircases[index];
        let trial = match catch_intensity {
            Some(borrowed) => {
                self.catch_trials += 1;
                debug!(
                    label = staircase.label(),
                    intensity = borrowed,
                    "Catch trial injected"
                );
                Trial {
                    label: staircase.label().to_string(),
                    side,
                    kind: staircase.kind(),
                    intensity: borrowed,
                    is_catch: true,
                }
            }
            None => Trial {
                label: staircase.label().to_string(),
                side,
                kind: staircase.kind(),
                intensity,
                is_catch: false,
            },
        };
        Ok(trial)
    }

    /// Forward a response to the named staircase.
    ///
    /// Clears the pending trial; a staircase that terminates leaves the pool.
    pub fn record_response(&mut self, label: &str, correct: bool) -> Result<StepResult> {
        let index = self
            .staircases
            .iter()
            .position(|s| s.label() == label)
            .ok_or_else(|| KernelError::UnknownCondition {
                label: label.to_string(),
            })?;

        let result = self.staircases[index].record_response(correct)?;
        if self.pending == Some(index) {
            self.pending = None;
        }
        if result.terminated {
            self.queue.retain(|&i| i != index);
        }
        Ok(result)
    }

    /// Drop the pending staircase trial without feedback.
    ///
    /// The next call to `next_trial` selects afresh.
    pub fn skip_pending(&mut self) {
        self.pending = None;
    }

    fn select(&mut self) -> Result<usize> {
        loop {
            if self.queue.is_empty() {
                self.refill();
                if self.queue.is_empty() {
                    return Err(KernelError::StaircaseExhausted);
                }
            }
            if let Some(index) = self.queue.pop_front()
                && !self.staircases[index].is_terminated()
            {
                return Ok(index);
            }
        }
    }

    fn refill(&mut self) {
        let mut pass: Vec<usize> = (0..self.staircases.len())
            .filter(|&i| !self.staircases[i].is_terminated())
            .collect();
        if self.config.selection == SelectionPolicy::Random {
            pass.shuffle(&mut self.rng);
        }
        self.queue.extend(pass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KindTag, StepType};

    fn condition(label: &str, side: Side) -> ConditionConfig {
        ConditionConfig {
            label: label.to_string(),
            side,
            kind: KindTag::Unilateral,
            start_val: 5.0,
            step_sizes: vec![0.5, 0.25],
            step_type: StepType::Linear,
            n_up: 1,
            n_down: 1,
            n_trials: 4,
            n_reversals: 2,
            min_val: 0.0,
            max_val: 20.0,
        }
    }

    fn no_catch(selection: SelectionPolicy) -> SessionConfig {
        SessionConfig {
            selection,
            catch_probability: 0.0,
            catch_warmup_trials: 0,
            seed: Some(11),
        }
    }

    fn three() -> Vec<ConditionConfig> {
        vec![
            condition("Unilateral-Left_0", Side::Left),
            condition("Unilateral-Right_0", Side::Right),
            condition("Unilateral-Left_1", Side::Left),
        ]
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let conds = vec![
            condition("Unilateral-Left_0", Side::Left),
            condition("Unilateral-Left_0", Side::Right),
        ];
        let err = StaircaseSession::new(&conds, SessionConfig::default()).unwrap_err();
        assert!(matches!(err, KernelError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_empty_session_rejected() {
        assert!(StaircaseSession::new(&[], SessionConfig::default()).is_err());
    }

    #[test]
    fn test_sequential_follows_configuration_order() {
        let mut session =
            StaircaseSession::new(&three(), no_catch(SelectionPolicy::Sequential)).unwrap();
        let mut labels = Vec::new();
        for _ in 0..6 {
            let trial = session.next_trial().unwrap();
            labels.push(trial.label.clone());
            session.record_response(&trial.label, true).unwrap();
        }
        assert_eq!(
            labels,
            vec![
                "Unilateral-Left_0",
                "Unilateral-Right_0",
                "Unilateral-Left_1",
                "Unilateral-Left_0",
                "Unilateral-Right_0",
                "Unilateral-Left_1",
            ]
        );
    }

    #[test]
    fn test_random_presents_each_once_per_pass() {
        let mut session =
            StaircaseSession::new(&three(), no_catch(SelectionPolicy::Random)).unwrap();
        for pass in 0..5 {
            let mut seen = HashSet::new();
            for _ in 0..3 {
                let trial = session.next_trial().unwrap();
                assert!(seen.insert(trial.label.clone()), "repeat within pass {pass}");
                // keep every staircase alive
                session.record_response(&trial.label, false).unwrap();
            }
        }
    }

    #[test]
    fn test_exhausted_after_all_terminate() {
        let mut session =
            StaircaseSession::new(&three(), no_catch(SelectionPolicy::Sequential)).unwrap();
        let mut flip = HashSet::new();
        let mut guard = 0;
        loop {
            match session.next_trial() {
                Ok(trial) => {
                    // alternate per label so reversals accumulate
                    let correct = flip.insert(trial.label.clone());
                    if !correct {
                        flip.remove(&trial.label);
                    }
                    session.record_response(&trial.label, correct).unwrap();
                }
                Err(e) => {
                    assert!(e.is_exhausted());
                    break;
                }
            }
            guard += 1;
            assert!(guard < 100, "session never exhausted");
        }
        assert!(session.is_exhausted());
        assert!(session.active_labels().is_empty());
        assert!(session.next_trial().unwrap_err().is_exhausted());
    }

    #[test]
    fn test_terminated_staircase_leaves_pool() {
        let mut conds = three();
        conds[0].n_trials = 1;
        conds[0].n_reversals = 1;
        let mut session =
            StaircaseSession::new(&conds, no_catch(SelectionPolicy::Sequential)).unwrap();

        // two answers on the first staircase: one direction change
        let t = session.next_trial().unwrap();
        session.record_response(&t.label, true).unwrap();
        session.record_response("Unilateral-Left_0", false).unwrap();
        assert!(session.staircase("Unilateral-Left_0").unwrap().is_terminated());

        for _ in 0..10 {
            let t = session.next_trial().unwrap();
            assert_ne!(t.label, "Unilateral-Left_0");
            session.record_response(&t.label, false).unwrap();
        }
    }

    #[test]
    fn test_unknown_label_rejected() {
        let mut session =
            StaircaseSession::new(&three(), no_catch(SelectionPolicy::Sequential)).unwrap();
        let err = session.record_response("Bilateral-Left_9", true).unwrap_err();
        assert_eq!(
            err,
            KernelError::UnknownCondition {
                label: "Bilateral-Left_9".to_string()
            }
        );
    }

    #[test]
    fn test_catch_needs_opposite_history() {
        let conds = vec![condition("Unilateral-Left_0", Side::Left)];
        let config = SessionConfig {
            selection: SelectionPolicy::Sequential,
            catch_probability: 1.0,
            catch_warmup_trials: 0,
            seed: Some(3),
        };
        let mut session = StaircaseSession::new(&conds, config).unwrap();
        for _ in 0..10 {
            let t = session.next_trial().unwrap();
            assert!(!t.is_catch, "no right-side intensity to borrow");
            session.record_response(&t.label, false).unwrap();
        }
    }

    #[test]
    fn test_catch_borrows_opposite_side_and_keeps_pending() {
        let conds = vec![
            condition("Unilateral-Left_0", Side::Left),
            condition("Unilateral-Right_0", Side::Right),
        ];
        let mut conds = conds;
        conds[1].start_val = 9.0;
        let config = SessionConfig {
            selection: SelectionPolicy::Sequential,
            catch_probability: 1.0,
            catch_warmup_trials: 2,
            seed: Some(5),
        };
        let mut session = StaircaseSession::new(&conds, config).unwrap();

        let t = session.next_trial().unwrap();
        assert_eq!(t.label, "Unilateral-Left_0");
        assert!(!t.is_catch);
        session.record_response(&t.label, false).unwrap();

        let t = session.next_trial().unwrap();
        assert_eq!(t.label, "Unilateral-Right_0");
        assert!(!t.is_catch, "still warming up");
        session.record_response(&t.label, false).unwrap();

        // left staircase is at 5.5 now; the catch borrows the right side's 9.0
        let t = session.next_trial().unwrap();
        assert!(t.is_catch);
        assert_eq!(t.side, Side::Left);
        assert_eq!(t.intensity, 9.0);
        assert_eq!(session.pending_label(), Some("Unilateral-Left_0"));
        assert_eq!(
            session.staircase("Unilateral-Left_0").unwrap().trials_presented(),
            1
        );
        assert_eq!(session.side_history(Side::Left), &[5.0, 5.5]);
        assert_eq!(session.catch_trials(), 1);
    }

    #[test]
    fn test_skip_pending_selects_afresh() {
        let mut session =
            StaircaseSession::new(&three(), no_catch(SelectionPolicy::Sequential)).unwrap();
        let first = session.next_trial().unwrap();
        assert_eq!(session.pending_label(), Some(first.label.as_str()));
        let again = session.next_trial().unwrap();
        assert_eq!(again.label, first.label);

        session.skip_pending();
        let next = session.next_trial().unwrap();
        assert_ne!(next.label, first.label);
    }

    #[test]
    fn test_seeded_sessions_are_reproducible() {
        let config = SessionConfig {
            selection: SelectionPolicy::Random,
            catch_probability: 0.3,
            catch_warmup_trials: 1,
            seed: Some(1234),
        };
        let run = || {
            let mut s = StaircaseSession::new(&three(), config.clone()).unwrap();
            let mut out = Vec::new();
            for _ in 0..30 {
                let t = s.next_trial().unwrap();
                if !t.is_catch {
                    s.record_response(&t.label, false).unwrap();
                }
                out.push(t);
            }
            out
        };
        assert_eq!(run(), run());
    }
}
