use relaypost_core::SyncLedger;
use relaypost_domain::{Result, SyncStats};

use crate::AppContext;

pub async fn sync_stats(ctx: &AppContext, target_id: Option<&str>) -> Result<SyncStats> {
    if let Some(target_id) = target_id {
        // Unknown ids surface as NotFound rather than all-zero counts.
        ctx.registry.get(target_id).await?;
    }
    ctx.ledger.stats(target_id).await
}

pub fn render_stats(scope: Option<&str>, stats: &SyncStats) -> String {
    let average = stats
        .avg_seconds_to_success
        .map_or_else(|| "n/a".to_string(), |secs| format!("{secs:.1}s"));
    format!(
        "{}: {} records (pending {}, syncing {}, success {}, failed {}), avg time to success {}\n",
        scope.unwrap_or("all targets"),
        stats.total(),
        stats.pending,
        stats.syncing,
        stats.success,
        stats.failed,
        average
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_successes() {
        let stats = SyncStats { pending: 2, failed: 1, ..SyncStats::default() };
        assert_eq!(
            render_stats(None, &stats),
            "all targets: 3 records (pending 2, syncing 0, success 0, failed 1), \
             avg time to success n/a\n"
        );
    }

    #[test]
    fn render_rounds_average() {
        let stats =
            SyncStats { success: 4, avg_seconds_to_success: Some(12.345), ..SyncStats::default() };
        assert!(render_stats(Some("t1"), &stats).ends_with("avg time to success 12.3s\n"));
    }
}
