//! Per-target sync pipeline
//!
//! connectivity probe -> taxonomy -> media -> submit -> id resolution ->
//! ledger transition. The stages are split so parallel dispatch can run
//! [`TargetPipeline::begin`] and [`TargetPipeline::prepare_and_submit`]
//! concurrently and [`TargetPipeline::finalize`] sequentially.
//!
//! Every error is caught here and turned into a `failed` ledger transition
//! plus a [`TargetReport`]; nothing propagates to the caller.

use std::sync::Arc;

use relaypost_domain::{ContentItem, Credentials, SyncKind, SyncStatus, Target, TaxonomyKind};
use tracing::{debug, info, instrument, warn};

use super::errors::{SyncError, SyncErrorCategory};
use super::interpreter::{InterpretContext, ResponseInterpreter};
use super::media::MediaSynchronizer;
use super::payload::{inline_media, rewrite_body, PostPayload};
use super::ports::{CredentialStore, RawResponse, RemoteClient, RemoteTarget, SyncLedger};
use super::report::TargetReport;
use super::taxonomy::TaxonomyResolver;

/// A payload that has been sent (or failed to send) and awaits id
/// resolution.
#[derive(Debug)]
pub struct Submission {
    pub remote: RemoteTarget,
    pub payload: PostPayload,
    pub kind: SyncKind,
    /// Remote post the submission updated, if any.
    pub known_id: Option<u64>,
    pub response: Result<RawResponse, SyncError>,
}

pub struct TargetPipeline {
    client: Arc<dyn RemoteClient>,
    ledger: Arc<dyn SyncLedger>,
    credentials: Arc<dyn CredentialStore>,
    taxonomy: TaxonomyResolver,
    media: MediaSynchronizer,
    interpreter: ResponseInterpreter,
}

impl TargetPipeline {
    pub fn new(
        client: Arc<dyn RemoteClient>,
        ledger: Arc<dyn SyncLedger>,
        credentials: Arc<dyn CredentialStore>,
        taxonomy: TaxonomyResolver,
        media: MediaSynchronizer,
    ) -> Self {
        let interpreter = ResponseInterpreter::new(Arc::clone(&client));
        Self { client, ledger, credentials, taxonomy, media, interpreter }
    }

    /// Full pipeline for one target.
    #[instrument(skip(self, target, item), fields(target_id = %target.id, item_id = item.id))]
    pub async fn run(&self, target: &Target, item: &ContentItem) -> TargetReport {
        let submitted = match self.begin(target, item.id).await {
            Ok(known_id) => self.prepare_and_submit(target, item, known_id).await,
            Err(err) => Err(err),
        };
        self.finalize(&target.id, item.id, submitted).await
    }

    /// Reset the ledger row and move it to `syncing`.
    ///
    /// Returns the remote id of a live post from a previous sync.
    pub async fn begin(&self, target: &Target, item_id: u64) -> Result<Option<u64>, SyncError> {
        let previous = self.ledger.get(&target.id, item_id).await?;
        let known_id = previous
            .filter(|record| {
                !(record.kind == SyncKind::Delete && record.status == SyncStatus::Success)
            })
            .and_then(|record| record.remote_id);
        let kind = if known_id.is_some() { SyncKind::Update } else { SyncKind::Create };

        self.ledger.create_or_reset(&target.id, item_id, kind, None).await?;
        self.ledger.transition(&target.id, item_id, SyncStatus::Syncing, None, None).await?;
        Ok(known_id)
    }

    /// Credentials for `target` from the credential store.
    pub async fn remote_target(&self, target: &Target) -> Result<RemoteTarget, SyncError> {
        let secret = self.credentials.secret(&target.id).await?.ok_or_else(|| {
            SyncError::Config(format!("no credentials stored for target {}", target.id))
        })?;
        Ok(RemoteTarget {
            target: target.clone(),
            credentials: Credentials { username: target.username.clone(), app_password: secret },
        })
    }

    /// Probe, resolve dependencies, build the payload and submit it.
    ///
    /// The submit call's own failure is carried in the returned
    /// [`Submission`] so `finalize` can still try to recover the id.
    pub async fn prepare_and_submit(
        &self,
        target: &Target,
        item: &ContentItem,
        known_id: Option<u64>,
    ) -> Result<Submission, SyncError> {
        let remote = self.remote_target(target).await?;
        self.client.probe(&remote).await?;

        let categories =
            self.taxonomy.ensure_terms(&remote, TaxonomyKind::Category, &item.categories).await;
        let tags = self.taxonomy.ensure_terms(&remote, TaxonomyKind::Tag, &item.tags).await;
        if !categories.skipped.is_empty() || !tags.skipped.is_empty() {
            warn!(
                target_id = %target.id,
                skipped = categories.skipped.len() + tags.skipped.len(),
                "submitting without unresolved terms"
            );
        }

        let featured_media = match &item.featured_media {
            Some(media) => match self.media.ensure_media(&remote, media).await {
                Ok(record) => record.remote_id,
                Err(err) => {
                    warn!(target_id = %target.id, media_id = media.id, error = %err,
                        "featured media failed, submitting without it");
                    None
                }
            },
            None => None,
        };

        let mut replacements = Vec::new();
        for media in inline_media(item) {
            match self.media.ensure_media(&remote, &media).await {
                Ok(record) => {
                    if let Some(url) = record.remote_url.filter(|url| !url.is_empty()) {
                        replacements.push((media.source_url.clone(), url));
                    }
                }
                Err(err) => {
                    warn!(target_id = %target.id, media_id = media.id, error = %err,
                        "inline media failed, keeping local url");
                }
            }
        }

        let content = rewrite_body(&item.body, &replacements);
        let payload =
            PostPayload::from_item(item, content, categories.remote_ids, tags.remote_ids, featured_media);
        self.submit(remote, payload, known_id).await
    }

    async fn submit(
        &self,
        remote: RemoteTarget,
        payload: PostPayload,
        known_id: Option<u64>,
    ) -> Result<Submission, SyncError> {
        if let Some(remote_id) = known_id {
            match self.client.update_post(&remote, remote_id, &payload).await {
                Err(err) if err.is_remote_not_found() => {
                    warn!(target_id = remote.id(), remote_id, "remote post is gone, recreating");
                }
                response => {
                    return Ok(Submission {
                        remote,
                        payload,
                        kind: SyncKind::Update,
                        known_id,
                        response,
                    });
                }
            }
        }

        // A previous attempt may have created the post without recording it.
        let existing = self.client.find_posts_by_slug(&remote, &payload.slug).await?;
        if let Some(post) = existing.into_iter().find(|post| post.slug == payload.slug) {
            debug!(target_id = remote.id(), remote_id = post.id, "updating post found by slug");
            let response = self.client.update_post(&remote, post.id, &payload).await;
            return Ok(Submission {
                remote,
                payload,
                kind: SyncKind::Update,
                known_id: Some(post.id),
                response,
            });
        }

        let response = self.client.create_post(&remote, &payload).await;
        Ok(Submission { remote, payload, kind: SyncKind::Create, known_id: None, response })
    }

    /// Resolve the remote id and write the final ledger transition.
    pub async fn finalize(
        &self,
        target_id: &str,
        item_id: u64,
        submitted: Result<Submission, SyncError>,
    ) -> TargetReport {
        let resolved = match submitted {
            Ok(submission) => self.resolve(submission).await,
            Err(err) => Err(err),
        };

        match resolved {
            Ok(remote_id) => self.record_success(target_id, item_id, remote_id).await,
            Err(err) => {
                self.record_failure(target_id, item_id, &err).await;
                TargetReport::failed(target_id, err)
            }
        }
    }

    async fn record_success(&self, target_id: &str, item_id: u64, remote_id: u64) -> TargetReport {
        if let Err(err) = self
            .ledger
            .transition(target_id, item_id, SyncStatus::Success, Some(remote_id), None)
            .await
        {
            warn!(target_id, item_id, error = %err, "failed to record sync success");
        }
        info!(target_id, item_id, remote_id, "item synced");
        TargetReport::synced(target_id, remote_id)
    }

    async fn resolve(&self, submission: Submission) -> Result<u64, SyncError> {
        let Submission { remote, payload, kind, known_id, response } = submission;
        match response {
            Ok(response) => {
                let ctx = InterpretContext { response: Some(&response), payload: &payload, known_id };
                self.interpreter.resolve_remote_id(&remote, ctx).await
            }
            // The write may have landed before the connection dropped.
            Err(err) if kind == SyncKind::Create && err.category() == SyncErrorCategory::Network => {
                let ctx = InterpretContext { response: None, payload: &payload, known_id: None };
                match self.interpreter.resolve_remote_id(&remote, ctx).await {
                    Ok(remote_id) => {
                        warn!(target_id = remote.id(), remote_id, error = %err,
                            "create errored but the post exists remotely");
                        Ok(remote_id)
                    }
                    Err(_) => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn record_failure(&self, target_id: &str, item_id: u64, err: &SyncError) {
        warn!(target_id, item_id, error = %err, kind = err.kind(), "item sync failed");
        if let Err(ledger_err) = self
            .ledger
            .transition(target_id, item_id, SyncStatus::Failed, None, Some(&err.ledger_message()))
            .await
        {
            warn!(target_id, item_id, error = %ledger_err, "failed to record sync failure");
        }
    }

    /// Delete the remote post recorded for `item_id`.
    ///
    /// A remote 404 counts as already deleted.
    #[instrument(skip(self, target), fields(target_id = %target.id))]
    pub async fn delete(&self, target: &Target, item_id: u64) -> TargetReport {
        let remote_id = match self.ledger.get_remote_id(&target.id, item_id).await {
            Ok(Some(remote_id)) => remote_id,
            Ok(None) => {
                return TargetReport::failed(
                    &target.id,
                    SyncError::NotFound(format!(
                        "no remote post recorded for item {item_id} on target {}",
                        target.id
                    )),
                );
            }
            Err(err) => return TargetReport::failed(&target.id, err.into()),
        };

        let deleted = match self.begin_delete(target, item_id).await {
            Ok(remote) => match self.client.delete_post(&remote, remote_id).await {
                Err(err) if err.is_remote_not_found() => {
                    debug!(remote_id, "remote post already deleted");
                    Ok(())
                }
                other => other,
            },
            Err(err) => Err(err),
        };

        match deleted {
            Ok(()) => self.record_success(&target.id, item_id, remote_id).await,
            Err(err) => {
                self.record_failure(&target.id, item_id, &err).await;
                TargetReport::failed(&target.id, err)
            }
        }
    }

    async fn begin_delete(&self, target: &Target, item_id: u64) -> Result<RemoteTarget, SyncError> {
        self.ledger.create_or_reset(&target.id, item_id, SyncKind::Delete, None).await?;
        self.ledger.transition(&target.id, item_id, SyncStatus::Syncing, None, None).await?;
        self.remote_target(target).await
    }
}

#[cfg(test)]
mod tests {
    use relaypost_domain::{now_ts, MediaRef, SyncKind, SyncStatus};

    use super::*;
    use crate::sync::report::TargetResult;
    use crate::sync::ports::CredentialStore;
    use crate::testing::{media, sample_item, term, Reply, TestEnv};

    fn remote_id(report: &TargetReport) -> u64 {
        match report.result {
            TargetResult::Synced { remote_id } => remote_id,
            ref other => panic!("expected synced, got {other:?}"),
        }
    }

    fn error(report: &TargetReport) -> SyncError {
        match &report.result {
            TargetResult::Failed(err) => err.clone(),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn creates_then_updates_in_place() {
        let env = TestEnv::new();
        let target = env.add_target("a").await.unwrap();
        let pipeline = env.pipeline();
        let item = sample_item(1);

        let first = pipeline.run(&target, &item).await;
        let second = pipeline.run(&target, &item).await;

        assert_eq!(remote_id(&first), remote_id(&second));
        assert_eq!(env.remote.call_count("create_post"), 1);
        assert_eq!(env.remote.call_count("update_post"), 1);
        assert_eq!(env.remote.posts("a").len(), 1);

        let record = env.ledger.rows().pop().unwrap();
        assert_eq!(record.status, SyncStatus::Success);
        assert_eq!(record.kind, SyncKind::Update);
        assert_eq!(env.ledger.rows().len(), 1);
    }

    #[tokio::test]
    async fn lost_ledger_row_dedups_by_slug() {
        let env = TestEnv::new();
        let target = env.add_target("a").await.unwrap();
        let item = sample_item(1);
        let existing = env.remote.insert_post("a", &item.slug, &item.title);

        let report = env.pipeline().run(&target, &item).await;

        assert_eq!(remote_id(&report), existing);
        assert_eq!(env.remote.call_count("create_post"), 0);
        assert_eq!(env.remote.posts("a").len(), 1);
    }

    #[tokio::test]
    async fn vanished_remote_post_is_recreated() {
        let env = TestEnv::new();
        let target = env.add_target("a").await.unwrap();
        let pipeline = env.pipeline();
        let item = sample_item(1);

        let first = remote_id(&pipeline.run(&target, &item).await);
        env.remote.delete_post(&crate::testing::remote_target("a"), first).await.unwrap();
        let second = remote_id(&pipeline.run(&target, &item).await);

        assert_ne!(first, second);
        assert_eq!(env.ledger.rows()[0].remote_id, Some(second));
    }

    #[tokio::test]
    async fn empty_create_response_resolves_by_slug() {
        let env = TestEnv::new();
        let target = env.add_target("a").await.unwrap();
        env.remote.script_create(Reply::Empty);

        let report = env.pipeline().run(&target, &sample_item(1)).await;

        assert_eq!(remote_id(&report), env.remote.posts("a")[0].id);
        assert_eq!(env.remote.call_count_for("a", "find_posts_by_slug"), 2);
    }

    #[tokio::test]
    async fn timeout_after_write_is_recovered() {
        let env = TestEnv::new();
        let target = env.add_target("a").await.unwrap();
        env.remote.script_create(Reply::FailAfterWrite(SyncError::Connectivity("timed out".into())));

        let report = env.pipeline().run(&target, &sample_item(1)).await;

        assert_eq!(remote_id(&report), env.remote.posts("a")[0].id);
        assert_eq!(env.ledger.rows()[0].status, SyncStatus::Success);
    }

    /// Validates a sync that outlives the stuck threshold keeps its result.
    ///
    /// Assertions:
    /// - the sweep fails the row while the submit is in flight
    /// - finalize still lands `success` with the remote id
    #[tokio::test]
    async fn late_success_overrides_stuck_sweep() {
        let env = TestEnv::new();
        let target = env.add_target("a").await.unwrap();
        let pipeline = env.pipeline();
        let item = sample_item(1);

        let known_id = pipeline.begin(&target, item.id).await.unwrap();
        let submitted = pipeline.prepare_and_submit(&target, &item, known_id).await;
        assert_eq!(env.ledger.sweep_stuck(now_ts() + 1).await.unwrap(), 1);
        let report = pipeline.finalize(&target.id, item.id, submitted).await;

        let record = env.ledger.rows().pop().unwrap();
        assert_eq!(record.status, SyncStatus::Success);
        assert_eq!(record.remote_id, Some(remote_id(&report)));
        assert_eq!(record.last_error, None);
        assert_eq!(env.remote.posts("a").len(), 1);
    }

    #[tokio::test]
    async fn unresolvable_failure_is_recorded() {
        let env = TestEnv::new();
        let target = env.add_target("a").await.unwrap();
        env.remote.script_create(Reply::Fail(SyncError::Connectivity("refused".into())));

        let report = env.pipeline().run(&target, &sample_item(1)).await;

        assert!(matches!(error(&report), SyncError::Connectivity(_)));
        let record = env.ledger.rows().pop().unwrap();
        assert_eq!(record.status, SyncStatus::Failed);
        assert_eq!(record.retry_count, 1);
        assert!(record.last_error.unwrap().starts_with("connectivity:"));
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_probe() {
        let env = TestEnv::new();
        let target = env.add_target("a").await.unwrap();
        env.credentials.remove("a").await.unwrap();

        let report = env.pipeline().run(&target, &sample_item(1)).await;

        assert!(matches!(error(&report), SyncError::Config(_)));
        assert_eq!(env.remote.call_count("probe"), 0);
    }

    #[tokio::test]
    async fn featured_media_failure_is_not_fatal() {
        let env = TestEnv::new();
        let target = env.add_target("a").await.unwrap();
        let mut item = sample_item(1);
        item.featured_media = Some(media(5, "hero.png"));
        env.remote.script_upload(Reply::Fail(SyncError::server(500, "disk full")));

        let report = env.pipeline().run(&target, &item).await;
        let post_id = remote_id(&report);

        let payload = env.remote.post_payload("a", post_id).unwrap();
        assert_eq!(payload.featured_media, None);
    }

    #[tokio::test]
    async fn terms_and_media_are_attached() {
        let env = TestEnv::new();
        let target = env.add_target("a").await.unwrap();
        let inline: MediaRef = media(6, "diagram.png");
        let mut item = sample_item(1);
        item.categories = vec![term(1, "Engineering", None)];
        item.tags = vec![term(2, "Rust", None)];
        item.featured_media = Some(media(5, "hero.png"));
        item.body = format!(r#"<p><img src="{}"></p>"#, inline.source_url);
        item.attachments = vec![inline];

        let post_id = remote_id(&env.pipeline().run(&target, &item).await);

        let payload = env.remote.post_payload("a", post_id).unwrap();
        assert_eq!(payload.categories.len(), 1);
        assert_eq!(payload.tags.len(), 1);
        assert!(payload.featured_media.is_some());
        assert!(payload.content.contains("https://a.remote.test/uploads/diagram.png"));
        assert!(!payload.content.contains("local.test"));
    }

    #[tokio::test]
    async fn delete_removes_remote_post_and_tolerates_404() {
        let env = TestEnv::new();
        let target = env.add_target("a").await.unwrap();
        let pipeline = env.pipeline();
        let item = sample_item(1);
        let post_id = remote_id(&pipeline.run(&target, &item).await);

        let deleted = pipeline.delete(&target, item.id).await;
        assert_eq!(remote_id(&deleted), post_id);
        assert!(env.remote.posts("a").is_empty());

        let again = pipeline.delete(&target, item.id).await;
        assert_eq!(remote_id(&again), post_id);

        // A later sync creates a fresh post instead of updating the deleted one.
        let recreated = remote_id(&pipeline.run(&target, &item).await);
        assert_ne!(recreated, post_id);
        assert_eq!(env.remote.call_count("update_post"), 0);
    }

    #[tokio::test]
    async fn delete_without_remote_id_is_not_found() {
        let env = TestEnv::new();
        let target = env.add_target("a").await.unwrap();

        let report = env.pipeline().delete(&target, 99).await;

        assert!(matches!(error(&report), SyncError::NotFound(_)));
        assert!(env.ledger.rows().is_empty());
    }
}
