//! Per-target results and their aggregation.

use relaypost_domain::DispatchMode;

use super::errors::SyncError;

/// What happened on one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetResult {
    Synced { remote_id: u64 },
    Scheduled { task_id: String },
    Failed(SyncError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub target_id: String,
    pub result: TargetResult,
}

impl TargetReport {
    pub fn synced(target_id: impl Into<String>, remote_id: u64) -> Self {
        Self { target_id: target_id.into(), result: TargetResult::Synced { remote_id } }
    }

    pub fn failed(target_id: impl Into<String>, err: SyncError) -> Self {
        Self { target_id: target_id.into(), result: TargetResult::Failed(err) }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.result, TargetResult::Failed(_))
    }
}

/// Tri-state aggregate, plus the deferred acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    AllSucceeded,
    PartialSuccess,
    AllFailed,
    Scheduled,
}

/// Result of one sync request across its targets, in target order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub item_id: u64,
    pub mode: DispatchMode,
    pub results: Vec<TargetReport>,
}

impl SyncReport {
    pub fn new(item_id: u64, mode: DispatchMode, results: Vec<TargetReport>) -> Self {
        Self { item_id, mode, results }
    }

    pub fn outcome(&self) -> SyncOutcome {
        let failed = self.results.iter().filter(|r| r.is_failure()).count();
        if failed == self.results.len() {
            return SyncOutcome::AllFailed;
        }
        if failed > 0 {
            return SyncOutcome::PartialSuccess;
        }
        if self.results.iter().any(|r| matches!(r.result, TargetResult::Scheduled { .. })) {
            SyncOutcome::Scheduled
        } else {
            SyncOutcome::AllSucceeded
        }
    }

    /// Target ids that did not fail.
    pub fn succeeded(&self) -> Vec<&str> {
        self.results.iter().filter(|r| !r.is_failure()).map(|r| r.target_id.as_str()).collect()
    }

    pub fn failed(&self) -> Vec<(&str, &SyncError)> {
        self.results
            .iter()
            .filter_map(|r| match &r.result {
                TargetResult::Failed(err) => Some((r.target_id.as_str(), err)),
                _ => None,
            })
            .collect()
    }

    /// Remote id recorded for `target_id`, if it synced.
    pub fn remote_id(&self, target_id: &str) -> Option<u64> {
        self.results.iter().find(|r| r.target_id == target_id).and_then(|r| match r.result {
            TargetResult::Synced { remote_id } => Some(remote_id),
            _ => None,
        })
    }

    /// `N succeeded, M failed` followed by one reason per failed target.
    pub fn summary(&self) -> String {
        let failed = self.failed();
        let mut summary = format!("{} succeeded, {} failed", self.succeeded().len(), failed.len());
        if !failed.is_empty() {
            let reasons: Vec<String> =
                failed.iter().map(|(target, err)| format!("{target}: {err}")).collect();
            summary.push_str(": ");
            summary.push_str(&reasons.join("; "));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(results: Vec<TargetReport>) -> SyncReport {
        SyncReport::new(1, DispatchMode::Serial, results)
    }

    #[test]
    fn outcome_is_tri_state() {
        let ok = TargetReport::synced("a", 1);
        let bad = TargetReport::failed("b", SyncError::Connectivity("down".into()));

        assert_eq!(report(vec![ok.clone()]).outcome(), SyncOutcome::AllSucceeded);
        assert_eq!(report(vec![ok, bad.clone()]).outcome(), SyncOutcome::PartialSuccess);
        assert_eq!(report(vec![bad]).outcome(), SyncOutcome::AllFailed);
    }

    #[test]
    fn scheduled_reports_are_acknowledgements() {
        let scheduled = TargetReport {
            target_id: "a".into(),
            result: TargetResult::Scheduled { task_id: "t".into() },
        };
        assert_eq!(report(vec![scheduled]).outcome(), SyncOutcome::Scheduled);
    }

    #[test]
    fn summary_lists_failure_reasons() {
        let summary = report(vec![
            TargetReport::synced("a", 1),
            TargetReport::failed("b", SyncError::Authentication("401".into())),
        ])
        .summary();
        assert_eq!(summary, "1 succeeded, 1 failed: b: Authentication failed: 401");
    }
}
