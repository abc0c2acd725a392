//! Target administration commands.

use std::fmt::Write as _;

use relaypost_domain::{Result, Target};
use tracing::instrument;

use crate::AppContext;

#[instrument(skip(ctx, password))]
pub async fn add_target(
    ctx: &AppContext,
    name: &str,
    base_url: &str,
    username: &str,
    password: &str,
) -> Result<Target> {
    ctx.registry.add(name, base_url, username, password).await
}

pub async fn list_targets(ctx: &AppContext, include_inactive: bool) -> Result<Vec<Target>> {
    ctx.registry.list(!include_inactive).await
}

#[instrument(skip(ctx))]
pub async fn deactivate_target(ctx: &AppContext, target_id: &str) -> Result<()> {
    ctx.registry.deactivate(target_id).await
}

#[instrument(skip(ctx))]
pub async fn remove_target(ctx: &AppContext, target_id: &str) -> Result<()> {
    ctx.registry.remove(target_id).await
}

/// One line per target: id, name, base URL and state.
pub fn render_targets(targets: &[Target]) -> String {
    if targets.is_empty() {
        return "no targets registered\n".to_string();
    }

    let mut out = String::new();
    for target in targets {
        let state = if target.active { "active" } else { "inactive" };
        let _ = writeln!(
            out,
            "{}  {:<20}  {:<40}  {}",
            target.id, target.name, target.base_url, state
        );
    }
    out
}
