//! Sync, delete and retry commands.

use std::fmt::Write as _;

use relaypost_core::{
    OrchestratorError, RetrySummary, SyncReport, TargetResult, TargetSelection,
};
use relaypost_domain::DispatchMode;

use crate::AppContext;

/// Every active target when `targets` is empty.
pub fn selection(targets: Vec<String>) -> TargetSelection {
    if targets.is_empty() {
        TargetSelection::All
    } else {
        TargetSelection::Ids(targets)
    }
}

pub async fn sync_item(
    ctx: &AppContext,
    item_id: u64,
    targets: Vec<String>,
    mode: Option<DispatchMode>,
) -> Result<SyncReport, OrchestratorError> {
    ctx.orchestrator.sync(item_id, selection(targets), mode).await
}

pub async fn delete_item(
    ctx: &AppContext,
    item_id: u64,
    targets: Vec<String>,
) -> Result<SyncReport, OrchestratorError> {
    ctx.orchestrator.delete(item_id, selection(targets)).await
}

/// Failed posts queued for the worker and failed media reset.
pub async fn retry_failed(
    ctx: &AppContext,
    target_id: &str,
    max_retries: u32,
) -> Result<RetrySummary, OrchestratorError> {
    ctx.orchestrator.retry_failed(target_id, max_retries).await
}

/// Summary line followed by one line per target.
pub fn render_report(report: &SyncReport) -> String {
    let mut out = format!("item {} ({}): {}\n", report.item_id, report.mode, report.summary());
    for target in &report.results {
        let _ = match &target.result {
            TargetResult::Synced { remote_id } => {
                writeln!(out, "  {}  synced  remote id {remote_id}", target.target_id)
            }
            TargetResult::Scheduled { task_id } => {
                writeln!(out, "  {}  scheduled  task {task_id}", target.target_id)
            }
            TargetResult::Failed(err) => {
                writeln!(out, "  {}  failed  {}", target.target_id, err.ledger_message())
            }
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use relaypost_core::{SyncError, TargetReport};

    use super::*;

    #[test]
    fn empty_selection_means_all_targets() {
        assert_eq!(selection(vec![]), TargetSelection::All);
        assert_eq!(selection(vec!["a".into()]), TargetSelection::Ids(vec!["a".into()]));
    }

    #[test]
    fn report_lists_each_target() {
        let report = SyncReport::new(
            7,
            DispatchMode::Parallel,
            vec![
                TargetReport::synced("a", 70),
                TargetReport::failed("b", SyncError::server(503, "maintenance")),
            ],
        );

        let rendered = render_report(&report);
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("item 7 (parallel): 1 succeeded, 1 failed"));
        assert_eq!(lines[1], "  a  synced  remote id 70");
        assert!(lines[2].starts_with("  b  failed  server:"));
    }
}
