//! Taxonomy dependency resolution
//!
//! Guarantees that every category/tag a post references exists on the
//! target before the post is submitted. Lookup order per term is the stored
//! mapping, then the remote slug, then the remote name, then creation.
//! Parents are resolved first along an explicit chain, bounded by
//! [`MAX_TERM_PARENT_DEPTH`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use relaypost_domain::constants::MAX_TERM_PARENT_DEPTH;
use relaypost_domain::{now_ts, TaxonomyKind, TermMapping, TermRef};
use tracing::{debug, instrument, warn};

use super::errors::SyncError;
use super::ports::{
    ContentSource, RemoteClient, RemoteTarget, RemoteTerm, TermMappingStore, TermPayload,
    TermQuery,
};

/// Outcome of [`TaxonomyResolver::ensure_terms`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermResolution {
    /// Remote ids in input order, failed terms omitted.
    pub remote_ids: Vec<u64>,
    /// Local term ids that could not be resolved, with the reason.
    pub skipped: Vec<(u64, SyncError)>,
}

type Memo = HashMap<u64, Result<u64, SyncError>>;

pub struct TaxonomyResolver {
    client: Arc<dyn RemoteClient>,
    mappings: Arc<dyn TermMappingStore>,
    content: Arc<dyn ContentSource>,
}

impl TaxonomyResolver {
    pub fn new(
        client: Arc<dyn RemoteClient>,
        mappings: Arc<dyn TermMappingStore>,
        content: Arc<dyn ContentSource>,
    ) -> Self {
        Self { client, mappings, content }
    }

    /// Ensure each term exists remotely and return the remote ids.
    ///
    /// A term that fails is logged and skipped; siblings still resolve.
    #[instrument(skip(self, remote, terms), fields(target_id = remote.id(), taxonomy = %kind))]
    pub async fn ensure_terms(
        &self,
        remote: &RemoteTarget,
        kind: TaxonomyKind,
        terms: &[TermRef],
    ) -> TermResolution {
        let mut memo = Memo::new();
        let mut resolution = TermResolution::default();

        for term in terms {
            match self.resolve_with_parents(remote, kind, term, &mut memo).await {
                Ok(remote_id) => {
                    if !resolution.remote_ids.contains(&remote_id) {
                        resolution.remote_ids.push(remote_id);
                    }
                }
                Err(err) => {
                    warn!(term_id = term.id, slug = %term.slug, error = %err, "skipping term");
                    resolution.skipped.push((term.id, err));
                }
            }
        }
        resolution
    }

    async fn resolve_with_parents(
        &self,
        remote: &RemoteTarget,
        kind: TaxonomyKind,
        term: &TermRef,
        memo: &mut Memo,
    ) -> Result<u64, SyncError> {
        if let Some(done) = memo.get(&term.id) {
            return done.clone();
        }

        let chain = self.parent_chain(kind, term, memo).await?;

        // Root-most ancestor first, the requested term last.
        for node in chain.iter().rev() {
            let parent_remote = match node.parent.and_then(|parent| memo.get(&parent)) {
                Some(Ok(parent_id)) => Some(*parent_id),
                Some(Err(err)) => {
                    return Err(SyncError::Validation {
                        status: None,
                        message: format!("parent of term {} failed: {err}", node.id),
                    });
                }
                None => None,
            };
            let result = self.resolve_one(remote, kind, node, parent_remote).await;
            memo.insert(node.id, result);
        }

        memo.get(&term.id).cloned().unwrap_or_else(|| {
            Err(SyncError::Internal(format!("term {} missing from resolution", term.id)))
        })
    }

    /// `term` followed by its unresolved ancestors, nearest first.
    async fn parent_chain(
        &self,
        kind: TaxonomyKind,
        term: &TermRef,
        memo: &Memo,
    ) -> Result<Vec<TermRef>, SyncError> {
        let mut chain = vec![term.clone()];
        if !kind.is_hierarchical() {
            return Ok(chain);
        }

        let mut visited: HashSet<u64> = HashSet::from([term.id]);
        let mut next = term.parent;
        while let Some(parent_id) = next {
            if memo.contains_key(&parent_id) {
                break;
            }
            if !visited.insert(parent_id) {
                return Err(SyncError::Validation {
                    status: None,
                    message: format!("term {} has a cyclic parent chain", term.id),
                });
            }
            if chain.len() > MAX_TERM_PARENT_DEPTH {
                return Err(SyncError::Validation {
                    status: None,
                    message: format!(
                        "term {} exceeds the parent depth limit of {MAX_TERM_PARENT_DEPTH}",
                        term.id
                    ),
                });
            }

            match self.content.get_term(kind, parent_id).await? {
                Some(parent) => {
                    next = parent.parent;
                    chain.push(parent);
                }
                None => {
                    warn!(term_id = term.id, parent_id, "parent term not found locally");
                    break;
                }
            }
        }
        Ok(chain)
    }

    async fn resolve_one(
        &self,
        remote: &RemoteTarget,
        kind: TaxonomyKind,
        term: &TermRef,
        parent_remote: Option<u64>,
    ) -> Result<u64, SyncError> {
        match self.mappings.get(remote.id(), kind, term.id).await {
            Ok(Some(mapping)) => return Ok(mapping.remote_id),
            Ok(None) => {}
            Err(err) => warn!(term_id = term.id, error = %err, "term mapping lookup failed"),
        }

        let found = match self.find_by_slug(remote, kind, term).await? {
            Some(existing) => Some(existing),
            None => self.find_by_name(remote, kind, term).await?,
        };

        let remote_term = match found {
            Some(existing) => existing,
            None => self.create(remote, kind, term, parent_remote).await?,
        };

        self.remember(remote, kind, term, &remote_term, parent_remote).await;
        Ok(remote_term.id)
    }

    async fn find_by_slug(
        &self,
        remote: &RemoteTarget,
        kind: TaxonomyKind,
        term: &TermRef,
    ) -> Result<Option<RemoteTerm>, SyncError> {
        if term.slug.is_empty() {
            return Ok(None);
        }
        let found =
            self.client.find_terms(remote, kind, &TermQuery::Slug(term.slug.clone())).await?;
        Ok(found.into_iter().find(|t| t.slug == term.slug))
    }

    async fn find_by_name(
        &self,
        remote: &RemoteTarget,
        kind: TaxonomyKind,
        term: &TermRef,
    ) -> Result<Option<RemoteTerm>, SyncError> {
        let name = term.name.trim();
        if name.is_empty() {
            return Ok(None);
        }
        let found =
            self.client.find_terms(remote, kind, &TermQuery::Search(name.to_string())).await?;
        Ok(found.into_iter().find(|t| t.name.trim().eq_ignore_ascii_case(name)))
    }

    async fn create(
        &self,
        remote: &RemoteTarget,
        kind: TaxonomyKind,
        term: &TermRef,
        parent_remote: Option<u64>,
    ) -> Result<RemoteTerm, SyncError> {
        let payload = TermPayload {
            name: term.name.clone(),
            slug: term.slug.clone(),
            parent: parent_remote.filter(|_| kind.is_hierarchical()),
            description: term.description.clone(),
        };

        match self.client.create_term(remote, kind, &payload).await {
            Ok(created) => {
                debug!(term_id = term.id, remote_id = created.id, "created remote term");
                Ok(created)
            }
            // Another writer may have created it between lookup and create.
            Err(err @ SyncError::Validation { .. }) => {
                match self.find_by_slug(remote, kind, term).await {
                    Ok(Some(existing)) => Ok(existing),
                    _ => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn remember(
        &self,
        remote: &RemoteTarget,
        kind: TaxonomyKind,
        term: &TermRef,
        remote_term: &RemoteTerm,
        parent_remote: Option<u64>,
    ) {
        let mapping = TermMapping {
            target_id: remote.id().to_string(),
            taxonomy: kind,
            local_id: term.id,
            remote_id: remote_term.id,
            slug: remote_term.slug.clone(),
            remote_parent: remote_term.parent.or(parent_remote),
            updated_at: now_ts(),
        };
        if let Err(err) = self.mappings.save(&mapping).await {
            warn!(term_id = term.id, error = %err, "failed to save term mapping");
        }
    }
}
