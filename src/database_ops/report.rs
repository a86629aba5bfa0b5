use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::database_ops::model::Upserted;
use crate::error::{IssueKind, LoadError};

/// Issues kept per pass; counts stay exact past the cap.
pub const ISSUE_SAMPLE_CAP: usize = 25;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowIssue {
    pub key: String,
    pub kind: IssueKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassSummary {
    pub pass: &'static str,
    pub read: u64,
    pub inserted: u64,
    pub updated: u64,
    /// Rows already present and left untouched (dates).
    pub unchanged: u64,
    /// Rows skipped because a referenced dimension row could not be resolved.
    pub skipped: u64,
    /// Rows rejected by a constraint or as invalid source data.
    pub failed: u64,
    pub issues: Vec<RowIssue>,
    pub elapsed_ms: u64,
}

impl PassSummary {
    pub fn new(pass: &'static str) -> Self {
        Self {
            pass,
            ..Default::default()
        }
    }

    pub fn record_read(&mut self, n: usize) {
        self.read += n as u64;
    }

    pub fn record_upsert(&mut self, out: Upserted) {
        if out.created {
            self.inserted += 1;
        } else {
            self.updated += 1;
        }
    }

    /// Count a row-level failure. Returns false when the error is not row-level
    /// and must abort the pass instead.
    pub fn record_issue(&mut self, key: String, err: &LoadError) -> bool {
        let Some(kind) = err.issue_kind() else {
            return false;
        };
        match kind {
            IssueKind::MissingReference => self.skipped += 1,
            IssueKind::ConstraintViolation | IssueKind::InvalidSource => self.failed += 1,
        }
        debug!(pass = self.pass, key = %key, kind = ?kind, error = %err, "row issue");
        if self.issues.len() < ISSUE_SAMPLE_CAP {
            self.issues.push(RowIssue {
                key,
                kind,
                message: err.to_string(),
            });
        }
        true
    }

    pub fn written(&self) -> u64 {
        self.inserted + self.updated
    }

    /// Emit the end-of-pass log line.
    pub fn log(&self) {
        info!(
            pass = self.pass,
            read = self.read,
            written = self.written(),
            inserted = self.inserted,
            updated = self.updated,
            unchanged = self.unchanged,
            skipped = self.skipped,
            failed = self.failed,
            elapsed_ms = self.elapsed_ms,
            "pass complete"
        );
        if self.skipped + self.failed > 0 {
            let sample: Vec<&str> = self.issues.iter().take(3).map(|i| i.key.as_str()).collect();
            warn!(
                pass = self.pass,
                skipped = self.skipped,
                failed = self.failed,
                issue_sample = ?sample,
                "pass finished with row issues"
            );
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub run_id: i64,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub passes: Vec<PassSummary>,
}

impl LoadReport {
    pub fn pass(&self, name: &str) -> Option<&PassSummary> {
        self.passes.iter().find(|p| p.pass == name)
    }

    pub fn total_issues(&self) -> u64 {
        self.passes.iter().map(|p| p.skipped + p.failed).sum()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::model::Dimension;

    #[test]
    fn issues_are_classified_and_capped() {
        let mut s = PassSummary::new("facts");
        for i in 0..30 {
            assert!(s.record_issue(format!("k{i}"), &LoadError::missing(Dimension::Book, i)));
        }
        assert!(s.record_issue(
            "dup".into(),
            &LoadError::ConstraintViolation {
                table: "fact_adaptation".into(),
                message: "duplicate".into()
            }
        ));
        assert_eq!(s.skipped, 30);
        assert_eq!(s.failed, 1);
        assert_eq!(s.issues.len(), ISSUE_SAMPLE_CAP);
        assert_eq!(s.issues[0].kind, IssueKind::MissingReference);
    }

    #[test]
    fn fatal_errors_are_not_recorded() {
        let mut s = PassSummary::new("books");
        assert!(!s.record_issue("x".into(), &LoadError::Transient("timeout".into())));
        assert!(!s.record_issue("x".into(), &LoadError::Storage("syntax".into())));
        assert_eq!(s.skipped + s.failed, 0);
        assert!(s.issues.is_empty());
    }

    #[test]
    fn upserts_split_into_inserted_and_updated() {
        let mut s = PassSummary::new("books");
        s.record_upsert(Upserted { key: 1, created: true });
        s.record_upsert(Upserted { key: 1, created: false });
        s.record_upsert(Upserted { key: 2, created: true });
        assert_eq!((s.inserted, s.updated, s.written()), (2, 1, 3));
    }

    #[test]
    fn report_serializes_issue_kinds_in_snake_case() {
        let mut s = PassSummary::new("bridge");
        s.record_issue("cast_id=3".into(), &LoadError::missing(Dimension::Actor, 3));
        let report = LoadReport {
            run_id: 1,
            dry_run: true,
            started_at: Utc::now(),
            elapsed_ms: 5,
            date_range: None,
            passes: vec![s],
        };
        let json = report.to_json();
        assert_eq!(json["passes"][0]["issues"][0]["kind"], "missing_reference");
        assert_eq!(report.total_issues(), 1);
        assert!(report.pass("bridge").is_some());
    }
}
