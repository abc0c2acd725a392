//! Remote identifier recovery
//!
//! A successful write does not always say which resource it produced: some
//! servers answer with an empty body, a list, or only a `Location` header.
//! [`ResponseInterpreter`] walks an ordered list of strategies and stops at
//! the first one that yields an id.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::errors::SyncError;
use super::payload::PostPayload;
use super::ports::{RawResponse, RemoteClient, RemotePost, RemoteTarget};

#[allow(clippy::expect_used)]
static POST_LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/posts/(\d+)/?(?:[?#].*)?$").expect("POST_LOCATION should compile - this is a bug")
});

/// One way of recovering the remote id, tried in [`STRATEGY_CHAIN`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Numeric `id` of a JSON object body.
    BodyId,
    /// `/posts/{id}` at the end of the `Location` header.
    LocationHeader,
    /// The id already recorded in the ledger, when updating.
    KnownId,
    /// Remote posts filtered by the submitted slug.
    SlugLookup,
    /// Remote full-text search on the submitted title.
    TitleSearch,
}

pub const STRATEGY_CHAIN: [Strategy; 5] = [
    Strategy::BodyId,
    Strategy::LocationHeader,
    Strategy::KnownId,
    Strategy::SlugLookup,
    Strategy::TitleSearch,
];

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BodyId => "body_id",
            Self::LocationHeader => "location_header",
            Self::KnownId => "known_id",
            Self::SlugLookup => "slug_lookup",
            Self::TitleSearch => "title_search",
        }
    }
}

/// Inputs available to every strategy.
#[derive(Debug, Clone, Copy)]
pub struct InterpretContext<'a> {
    pub response: Option<&'a RawResponse>,
    pub payload: &'a PostPayload,
    pub known_id: Option<u64>,
}

/// Numeric `id` field of a JSON object body.
pub fn id_from_body(response: &RawResponse) -> Option<u64> {
    let body = response.json()?;
    let id = body.as_object()?.get("id")?;
    id.as_u64()
        .or_else(|| id.as_str().and_then(|raw| raw.trim().parse().ok()))
        .filter(|id| *id > 0)
}

/// Id from a `Location` value such as `https://site/wp-json/wp/v2/posts/42`.
pub fn id_from_location(location: &str) -> Option<u64> {
    let captures = POST_LOCATION.captures(location.trim())?;
    captures.get(1)?.as_str().parse().ok().filter(|id| *id > 0)
}

/// Exact slug match, else the first (most recent) result.
pub fn select_by_slug(posts: &[RemotePost], slug: &str) -> Option<u64> {
    posts.iter().find(|post| post.slug == slug).or_else(|| posts.first()).map(|post| post.id)
}

/// Slug match, else exact title match, else the first result.
pub fn select_by_title(posts: &[RemotePost], slug: &str, title: &str) -> Option<u64> {
    let title = title.trim();
    posts
        .iter()
        .find(|post| post.slug == slug)
        .or_else(|| posts.iter().find(|post| post.title.trim() == title))
        .or_else(|| posts.first())
        .map(|post| post.id)
}

/// Resolves remote post ids from write responses.
pub struct ResponseInterpreter {
    client: Arc<dyn RemoteClient>,
}

impl ResponseInterpreter {
    pub fn new(client: Arc<dyn RemoteClient>) -> Self {
        Self { client }
    }

    /// Walk the strategy chain; `AmbiguousResponse` when every step comes up
    /// empty.
    ///
    /// Lookup failures are logged and the chain moves on; the last one is
    /// included in the returned error.
    pub async fn resolve_remote_id(
        &self,
        remote: &RemoteTarget,
        ctx: InterpretContext<'_>,
    ) -> Result<u64, SyncError> {
        let mut last_lookup_error: Option<SyncError> = None;

        for strategy in STRATEGY_CHAIN {
            match self.attempt(strategy, remote, ctx).await {
                Ok(Some(id)) => {
                    debug!(
                        target_id = remote.id(),
                        strategy = strategy.as_str(),
                        remote_id = id,
                        "resolved remote id"
                    );
                    return Ok(id);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        target_id = remote.id(),
                        strategy = strategy.as_str(),
                        error = %err,
                        "remote id lookup failed"
                    );
                    last_lookup_error = Some(err);
                }
            }
        }

        let mut message = format!(
            "could not determine remote id for slug '{}' (status {})",
            ctx.payload.slug,
            ctx.response.map_or_else(|| "none".to_string(), |r| r.status.to_string())
        );
        if let Some(err) = last_lookup_error {
            message.push_str(&format!("; last lookup error: {err}"));
        }
        Err(SyncError::AmbiguousResponse(message))
    }

    async fn attempt(
        &self,
        strategy: Strategy,
        remote: &RemoteTarget,
        ctx: InterpretContext<'_>,
    ) -> Result<Option<u64>, SyncError> {
        match strategy {
            Strategy::BodyId => Ok(ctx.response.and_then(id_from_body)),
            Strategy::LocationHeader => {
                Ok(ctx.response.and_then(|r| r.header("location")).and_then(id_from_location))
            }
            Strategy::KnownId => Ok(ctx.known_id),
            Strategy::SlugLookup => {
                if ctx.payload.slug.is_empty() {
                    return Ok(None);
                }
                let posts = self.client.find_posts_by_slug(remote, &ctx.payload.slug).await?;
                Ok(select_by_slug(&posts, &ctx.payload.slug))
            }
            Strategy::TitleSearch => {
                if ctx.payload.title.trim().is_empty() {
                    return Ok(None);
                }
                let posts = self.client.search_posts(remote, &ctx.payload.title).await?;
                Ok(select_by_title(&posts, &ctx.payload.slug, &ctx.payload.title))
            }
        }
    }
}
