//! Pooled psychometric function from staircase data.
//!
//! All `(intensity, response)` pairs of a session are sorted by intensity
//! and cut into bins holding the same number of trials. A cumulative normal
//! `P(x) = Φ((x - mean) / std_dev)` is then fitted to the bin proportions by
//! weighted least squares, and its inverse gives a threshold at any
//! response level.

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

/// One bin of pooled trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    /// Mean intensity of the trials in the bin
    pub intensity: f64,
    /// Share of `true` responses
    pub proportion: f64,
    pub count: usize,
}

/// Sort `samples` by intensity and split them into `bins` equal-count bins.
/// Leftover trials go to the last bin.
pub fn pool_bins(samples: &[(f64, bool)], bins: usize) -> Result<Vec<Bin>> {
    if bins == 0 {
        bail!("bin count must be > 0");
    }
    if samples.len() < bins {
        bail!("{} trials cannot fill {bins} bins", samples.len());
    }
    if samples.iter().any(|(x, _)| !x.is_finite()) {
        bail!("non-finite intensity in pooled data");
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let per_bin = sorted.len() / bins;
    let mut out = Vec::with_capacity(bins);
    for b in 0..bins {
        let start = b * per_bin;
        let end = if b + 1 == bins { sorted.len() } else { start + per_bin };
        let chunk = &sorted[start..end];
        let n = chunk.len() as f64;
        out.push(Bin {
            intensity: chunk.iter().map(|(x, _)| x).sum::<f64>() / n,
            proportion: chunk.iter().filter(|(_, r)| *r).count() as f64 / n,
            count: chunk.len(),
        });
    }
    Ok(out)
}

/// Cumulative normal fitted to binned proportions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumulativeNormalFit {
    pub mean: f64,
    pub std_dev: f64,
    /// Weighted sum of squared residuals at the optimum
    pub residual: f64,
}

impl CumulativeNormalFit {
    /// Fit by pattern search over `(mean, ln std_dev)`.
    pub fn fit(bins: &[Bin]) -> Result<Self> {
        let total: usize = bins.iter().map(|b| b.count).sum();
        if total == 0 {
            bail!("no trials to fit");
        }
        let lo = bins.iter().map(|b| b.intensity).fold(f64::INFINITY, f64::min);
        let hi = bins.iter().map(|b| b.intensity).fold(f64::NEG_INFINITY, f64::max);
        if !(hi > lo) {
            bail!("need at least two distinct intensities to fit, got range [{lo}, {hi}]");
        }
        let unit = standard_normal()?;
        let loss = |mean: f64, log_sd: f64| -> f64 {
            let sd = log_sd.exp();
            bins.iter()
                .map(|b| {
                    let r = b.proportion - unit.cdf((b.intensity - mean) / sd);
                    b.count as f64 * r * r
                })
                .sum()
        };

        let span = hi - lo;
        let weight = |b: &Bin| b.count as f64 / total as f64;
        let mut mean: f64 = bins.iter().map(|b| weight(b) * b.intensity).sum();
        let mut log_sd = (span / 4.0).ln();
        let mut best = loss(mean, log_sd);
        let mut step_mean = span / 4.0;
        let mut step_sd = 0.5;

        for _ in 0..20_000 {
            let mut improved = false;
            for (dm, ds) in [
                (step_mean, 0.0),
                (-step_mean, 0.0),
                (0.0, step_sd),
                (0.0, -step_sd),
            ] {
                let candidate = loss(mean + dm, log_sd + ds);
                if candidate < best {
                    best = candidate;
                    mean += dm;
                    log_sd += ds;
                    improved = true;
                }
            }
            if !improved {
                step_mean /= 2.0;
                step_sd /= 2.0;
                if step_mean < span * 1e-10 && step_sd < 1e-10 {
                    break;
                }
            }
        }

        let std_dev = log_sd.exp();
        if !(mean.is_finite() && std_dev.is_finite() && std_dev > 0.0) {
            bail!("fit diverged: mean {mean}, std_dev {std_dev}");
        }
        Ok(Self {
            mean,
            std_dev,
            residual: best,
        })
    }

    pub fn eval(&self, intensity: f64) -> f64 {
        standard_normal()
            .map(|n| n.cdf((intensity - self.mean) / self.std_dev))
            .unwrap_or(f64::NAN)
    }

    /// Intensity at which the fitted curve reaches `level`, for `level` in (0, 1).
    pub fn inverse(&self, level: f64) -> Option<f64> {
        if !(level > 0.0 && level < 1.0) {
            return None;
        }
        let n = standard_normal().ok()?;
        Some(self.mean + self.std_dev * n.inverse_cdf(level))
    }
}

fn standard_normal() -> Result<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| anyhow!("standard normal: {e}"))
}
