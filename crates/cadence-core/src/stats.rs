//! Correction statistics
//!
//! Process-lifetime aggregate of how often tempo correction kicked in.
//! Shared by every caller of one engine instance, so updates go through a
//! single mutex and one call's counters are always applied together.

use crate::validation::CorrectionLabel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct CorrectionStatistics {
    total: u64,
    corrected: u64,
    correction_types: BTreeMap<String, u64>,
    prior_used: u64,
}

/// Thread-safe correction counters
#[derive(Debug, Default)]
pub struct StatisticsTracker {
    inner: Mutex<CorrectionStatistics>,
}

impl StatisticsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished analysis
    ///
    /// `correction` is `Some` only when the tempo was corrected.
    pub fn record(&self, correction: Option<&CorrectionLabel>, prior_used: bool) {
        let mut stats = self.lock();
        stats.total += 1;
        if let Some(label) = correction {
            stats.corrected += 1;
            *stats
                .correction_types
                .entry(label.as_str().to_string())
                .or_insert(0) += 1;
        }
        if prior_used {
            stats.prior_used += 1;
        }
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let stats = self.lock();
        StatisticsSnapshot {
            total: stats.total,
            corrected: stats.corrected,
            correction_types: stats.correction_types.clone(),
            prior_used: stats.prior_used,
            correction_rate: rate(stats.corrected, stats.total),
            prior_usage_rate: rate(stats.prior_used, stats.total),
        }
    }

    // A panic elsewhere while holding the lock leaves the counters intact
    fn lock(&self) -> MutexGuard<'_, CorrectionStatistics> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn rate(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// Read-only view of the statistics with derived rates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub total: u64,
    pub corrected: u64,
    pub correction_types: BTreeMap<String, u64>,
    pub prior_used: u64,
    pub correction_rate: f64,
    pub prior_usage_rate: f64,
}

impl std::fmt::Display for StatisticsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Tempo correction statistics")?;
        writeln!(f, "  analyses:          {}", self.total)?;
        writeln!(
            f,
            "  corrected:         {} ({:.1}%)",
            self.corrected,
            self.correction_rate * 100.0
        )?;
        writeln!(
            f,
            "  tempo prior used:  {} ({:.1}%)",
            self.prior_used,
            self.prior_usage_rate * 100.0
        )?;
        if !self.correction_types.is_empty() {
            writeln!(f, "  corrections by type:")?;
            let mut types: Vec<_> = self.correction_types.iter().collect();
            types.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (label, count) in types {
                writeln!(f, "    {:<16} {}", label, count)?;
            }
        }
        Ok(())
    }
}
