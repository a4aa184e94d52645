//! Results collection and output for threshold sessions.
//!
//! Two outputs per run:
//! - a JSON-lines trial log, appended and flushed after every trial so an
//!   aborted session still leaves every presented trial on disk
//! - a pretty-printed `ExperimentResult` with per-staircase summaries,
//!   written once the session ends

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use threshold_kernel::{ConditionKind, Side, Staircase};

use crate::experiment::ExperimentRunnerConfig;
use crate::observer::Response;
use crate::psychometric::{CumulativeNormalFit, pool_bins};

/// One presented trial, catch and training trials included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Position in presentation order, starting at 0
    pub trial_index: usize,
    pub condition_label: String,
    pub side: Side,
    pub kind: ConditionKind,
    pub is_catch_trial: bool,
    pub is_training: bool,
    /// Intensity actually presented
    pub intensity: f64,
    pub response: Response,
}

/// Append-only JSON-lines log of trial records.
///
/// Every record is flushed as soon as it is written; dropping the log
/// flushes whatever is still buffered.
pub struct TrialLog {
    path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

impl TrialLog {
    /// Create (or truncate) the log at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .with_context(|| format!("creating trial log {}", path.display()))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn append(&mut self, record: &TrialRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this handle.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Read a log back, skipping blank lines.
    pub fn read(path: impl AsRef<Path>) -> Result<Vec<TrialRecord>> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("opening trial log {}", path.display()))?;
        let mut records = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line)
                .with_context(|| format!("{}:{}: malformed trial record", path.display(), n + 1))?;
            records.push(record);
        }
        Ok(records)
    }
}

impl Drop for TrialLog {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Final state of one staircase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaircaseSummary {
    pub label: String,
    pub side: Side,
    pub kind: ConditionKind,
    pub trials_presented: usize,
    pub terminated: bool,
    /// Intensity at the end of the run (the next one that would have been shown)
    pub final_intensity: f64,
    /// Intensity of every staircase trial, in order
    pub intensities: Vec<f64>,
    /// Response fed to the staircase for each of those trials
    pub responses: Vec<bool>,
    pub reversal_intensities: Vec<f64>,
    /// Mean of the last reversals, if any
    pub threshold: Option<f64>,
}

impl StaircaseSummary {
    pub fn from_staircase(staircase: &Staircase, average_reversals: usize) -> Self {
        Self {
            label: staircase.label().to_string(),
            side: staircase.side(),
            kind: staircase.kind(),
            trials_presented: staircase.trials_presented(),
            terminated: staircase.is_terminated(),
            final_intensity: staircase.intensity(),
            intensities: staircase.history().iter().map(|r| r.intensity).collect(),
            responses: staircase.history().iter().map(|r| r.correct).collect(),
            reversal_intensities: staircase.reversal_intensities().to_vec(),
            threshold: staircase.threshold(average_reversals),
        }
    }
}

/// Results from a single session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResult {
    /// Configuration the session ran with
    pub config: ExperimentRunnerConfig,
    /// Observer that answered the trials
    pub observer: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Every presented trial
    pub trials: Vec<TrialRecord>,
    pub staircases: Vec<StaircaseSummary>,
    /// Staircase trials whose response reached a staircase
    pub valid_trials: usize,
    pub catch_trials: usize,
    pub training_trials: usize,
    /// Trials with no response
    pub timeouts: usize,
    /// Whether every staircase terminated (false when the trial cap was hit)
    pub completed: bool,
}

impl ExperimentResult {
    /// Proportion of catch trials answered correctly.
    pub fn catch_accuracy(&self) -> Option<f64> {
        let answered: Vec<bool> = self
            .trials
            .iter()
            .filter(|t| t.is_catch_trial)
            .filter_map(|t| t.response.correct())
            .collect();
        if answered.is_empty() {
            return None;
        }
        Some(answered.iter().filter(|c| **c).count() as f64 / answered.len() as f64)
    }

    pub fn staircase(&self, label: &str) -> Option<&StaircaseSummary> {
        self.staircases.iter().find(|s| s.label == label)
    }

    /// Cumulative normal fitted to the trials of every staircase pooled
    /// into `bins` bins. Responses are the ones the staircases received.
    pub fn pooled_fit(&self, bins: usize) -> Result<CumulativeNormalFit> {
        let samples: Vec<(f64, bool)> = self
            .staircases
            .iter()
            .flat_map(|s| s.intensities.iter().copied().zip(s.responses.iter().copied()))
            .collect();
        CumulativeNormalFit::fit(&pool_bins(&samples, bins)?)
    }

    /// Human-readable table of per-staircase thresholds.
    pub fn format_summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{:<22} {:>6} {:>7} {:>10} {:>10}\n",
            "staircase", "trials", "revs", "final", "threshold"
        ));
        for s in &self.staircases {
            let threshold = s
                .threshold
                .map(|t| format!("{t:.3}"))
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "{:<22} {:>6} {:>7} {:>10.3} {:>10}\n",
                s.label,
                s.trials_presented,
                s.reversal_intensities.len(),
                s.final_intensity,
                threshold
            ));
        }
        let catch = self
            .catch_accuracy()
            .map(|a| format!("{:.1}%", a * 100.0))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "valid={} catch={} (accuracy {}) training={} timeouts={} completed={} duration={}\n",
            self.valid_trials,
            self.catch_trials,
            catch,
            self.training_trials,
            self.timeouts,
            self.completed,
            format_duration((self.ended_at - self.started_at).num_milliseconds().max(0) as u64)
        ));
        out
    }

    /// Save results to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load results from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let result = serde_json::from_str(&json)?;
        Ok(result)
    }
}

/// Answers collected for one fixed-intensity condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionAccuracy {
    pub label: String,
    pub side: Side,
    pub kind: ConditionKind,
    pub intensity: f64,
    /// Answered trials counted, at most the per-condition cap
    pub answered: usize,
    pub correct: usize,
}

impl ConditionAccuracy {
    pub fn accuracy(&self) -> Option<f64> {
        (self.answered > 0).then(|| self.correct as f64 / self.answered as f64)
    }
}

/// Results from a constant-stimuli block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantStimuliResult {
    pub config: ExperimentRunnerConfig,
    pub observer: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Every presented trial
    pub trials: Vec<TrialRecord>,
    pub conditions: Vec<ConditionAccuracy>,
    pub catch_trials: usize,
    pub timeouts: usize,
    /// Whether the whole planned list was presented
    pub completed: bool,
}

impl ConstantStimuliResult {
    pub fn condition(&self, label: &str) -> Option<&ConditionAccuracy> {
        self.conditions.iter().find(|c| c.label == label)
    }

    /// Human-readable table of per-condition accuracy.
    pub fn format_summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{:<22} {:>10} {:>8} {:>9}\n",
            "condition", "intensity", "answers", "accuracy"
        ));
        for c in &self.conditions {
            let accuracy = c
                .accuracy()
                .map(|a| format!("{:.1}%", a * 100.0))
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "{:<22} {:>10.3} {:>8} {:>9}\n",
                c.label, c.intensity, c.answered, accuracy
            ));
        }
        out.push_str(&format!(
            "trials={} catch={} timeouts={} completed={} duration={}\n",
            self.trials.len(),
            self.catch_trials,
            self.timeouts,
            self.completed,
            format_duration((self.ended_at - self.started_at).num_milliseconds().max(0) as u64)
        ));
        out
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let result = serde_json::from_str(&json)?;
        Ok(result)
    }
}

/// Format a duration in milliseconds for display.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{:.1}m", ms as f64 / 60_000.0)
    }
}
