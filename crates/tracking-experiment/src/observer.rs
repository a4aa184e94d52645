//! Simulated observers.
//!
//! An observer stands in for the subject: it sees the trial and the
//! stimulus and answers correct, incorrect, or not at all.

use anyhow::{Result, anyhow, bail};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use threshold_kernel::Trial;

use crate::experiment::Polarity;
use crate::stimulus::Stimulus;

/// Outcome of one presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Response {
    Correct,
    Incorrect,
    /// No answer within the response window
    Timeout,
}

impl Response {
    pub fn from_correct(correct: bool) -> Self {
        if correct {
            Response::Correct
        } else {
            Response::Incorrect
        }
    }

    /// `None` for a timeout.
    pub fn correct(self) -> Option<bool> {
        match self {
            Response::Correct => Some(true),
            Response::Incorrect => Some(false),
            Response::Timeout => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Response::Correct => "correct",
            Response::Incorrect => "incorrect",
            Response::Timeout => "timeout",
        }
    }
}

/// Something that answers trials.
pub trait Observer {
    fn name(&self) -> &str;

    fn respond(&mut self, trial: &Trial, stimulus: &Stimulus) -> Response;
}

/// Parameters of the psychometric observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Intensity at which the error probability is halfway
    pub mean: f64,
    /// Spread of the cumulative normal
    pub std_dev: f64,
    /// Floor of the error probability
    pub guess_rate: f64,
    /// Errors that never happen regardless of intensity
    pub lapse_rate: f64,
    /// Chance of not answering at all
    pub timeout_probability: f64,
    pub seed: Option<u64>,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            mean: 3.0,
            std_dev: 0.1,
            guess_rate: 0.0,
            lapse_rate: 0.0,
            timeout_probability: 0.0,
            seed: None,
        }
    }
}

/// Observer whose error probability is a cumulative normal in intensity.
///
/// ```text
/// p_error = guess + (1 - guess - lapse) * Φ((intensity - mean) / std_dev)
/// ```
///
/// Higher intensities produce more errors, which matches speed and flicker
/// rate where a faster stimulus is harder to follow.
pub struct PsychometricObserver {
    config: ObserverConfig,
    curve: Normal,
    rng: ChaCha8Rng,
}

impl PsychometricObserver {
    pub fn new(config: ObserverConfig) -> Result<Self> {
        for (name, value) in [
            ("guess_rate", config.guess_rate),
            ("lapse_rate", config.lapse_rate),
            ("timeout_probability", config.timeout_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{name} {value} outside [0, 1]");
            }
        }
        if config.guess_rate + config.lapse_rate > 1.0 {
            bail!(
                "guess_rate + lapse_rate = {} exceeds 1",
                config.guess_rate + config.lapse_rate
            );
        }
        let curve = Normal::new(config.mean, config.std_dev)
            .map_err(|e| anyhow!("invalid observer curve: {e}"))?;
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        Ok(Self {
            config,
            curve,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    pub fn error_probability(&self, intensity: f64) -> f64 {
        let c = &self.config;
        c.guess_rate + (1.0 - c.guess_rate - c.lapse_rate) * self.curve.cdf(intensity)
    }
}

impl Observer for PsychometricObserver {
    fn name(&self) -> &str {
        "psychometric"
    }

    fn respond(&mut self, trial: &Trial, _stimulus: &Stimulus) -> Response {
        let timeout_roll: f64 = self.rng.random();
        if timeout_roll < self.config.timeout_probability {
            return Response::Timeout;
        }
        let decision: f64 = self.rng.random();
        Response::from_correct(decision > self.error_probability(trial.intensity))
    }
}

/// Observer with a hard threshold.
///
/// On the easy side of `threshold` it reads the stimulus perfectly; on the
/// hard side it sees nothing and always answers "no". Whether that answer
/// is correct depends on the stimulus, so accuracy beyond the threshold
/// sits at the share of "no" stimuli.
pub struct ThresholdObserver {
    threshold: f64,
    polarity: Polarity,
}

impl ThresholdObserver {
    pub fn new(threshold: f64, polarity: Polarity) -> Result<Self> {
        if !threshold.is_finite() {
            bail!("observer threshold {threshold} must be finite");
        }
        Ok(Self {
            threshold,
            polarity,
        })
    }

    pub fn sees(&self, intensity: f64) -> bool {
        match self.polarity {
            Polarity::HigherIsHarder => intensity <= self.threshold,
            Polarity::HigherIsEasier => intensity >= self.threshold,
        }
    }
}

impl Observer for ThresholdObserver {
    fn name(&self) -> &str {
        "threshold"
    }

    fn respond(&mut self, trial: &Trial, stimulus: &Stimulus) -> Response {
        let expected = stimulus.expects_yes();
        let answer = self.sees(trial.intensity) && expected;
        Response::from_correct(answer == expected)
    }
}
