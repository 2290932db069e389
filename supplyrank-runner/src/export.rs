//! Export of ranked candidates and search trials as CSV.

use std::path::Path;

use anyhow::{Context, Result};

use crate::pipeline::ScoredCandidate;
use crate::search::{TrialRecord, TrialStatus};

// ─── CSV export ─────────────────────────────────────────────────────

/// Ranked candidates as CSV.
///
/// Columns: rank, purchase_id, score
pub fn export_candidates_csv(candidates: &[ScoredCandidate]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["rank", "purchase_id", "score"])?;
    for c in candidates {
        wtr.write_record([
            &c.rank.to_string(),
            &c.id.to_string(),
            &format!("{:.6}", c.score),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Search trials as CSV, one row per trial in trial order.
///
/// Columns: trial_id, status, score, n_estimators, max_depth, learning_rate,
/// min_samples_leaf, l2_regularization, subsample, reason
pub fn export_trials_csv(trials: &[TrialRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "trial_id",
        "status",
        "score",
        "n_estimators",
        "max_depth",
        "learning_rate",
        "min_samples_leaf",
        "l2_regularization",
        "subsample",
        "reason",
    ])?;
    for t in trials {
        let (status, score, reason) = match &t.status {
            TrialStatus::Completed { .. } => ("completed", format!("{:.6}", t.score), ""),
            TrialStatus::Failed { reason } => ("failed", String::new(), reason.as_str()),
        };
        let p = &t.params;
        wtr.write_record([
            t.trial_id.to_string(),
            status.to_string(),
            score,
            p.n_estimators.to_string(),
            p.max_depth.to_string(),
            format!("{:.6}", p.learning_rate),
            p.min_samples_leaf.to_string(),
            format!("{:.6}", p.l2_regularization),
            format!("{:.4}", p.subsample),
            reason.to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Write ranked candidates to `path`, creating parent directories.
pub fn write_candidates_csv(candidates: &[ScoredCandidate], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output dir: {}", parent.display()))?;
    }
    let csv = export_candidates_csv(candidates)?;
    std::fs::write(path, csv).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use supplyrank_core::frame::Value;
    use supplyrank_core::trainer::HyperParams;

    #[test]
    fn candidates_csv_has_header_and_rows() {
        let rows = vec![
            ScoredCandidate {
                id: Value::Int(17),
                score: 0.9,
                rank: 1,
            },
            ScoredCandidate {
                id: Value::Str("p-3".into()),
                score: 0.25,
                rank: 2,
            },
        ];
        let csv = export_candidates_csv(&rows).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "rank,purchase_id,score");
        assert_eq!(lines[1], "1,17,0.900000");
        assert_eq!(lines[2], "2,p-3,0.250000");
    }

    #[test]
    fn failed_trials_have_empty_score() {
        let trials = vec![TrialRecord {
            trial_id: 0,
            params: HyperParams::default(),
            score: f64::NEG_INFINITY,
            status: TrialStatus::Failed {
                reason: "labels are constant".into(),
            },
        }];
        let csv = export_trials_csv(&trials).unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert!(row.starts_with("0,failed,,100,3,"));
        assert!(row.ends_with("labels are constant"));
    }

    #[test]
    fn writes_into_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/ranked.csv");
        write_candidates_csv(&[], &path).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "rank,purchase_id,score\n");
    }
}
