//! Scriptable in-memory stand-in for a remote content API.
//!
//! Each target id gets its own isolated site so multi-target tests see
//! independent post, term and media collections.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use relaypost_domain::TaxonomyKind;
use serde_json::json;

use crate::sync::errors::SyncError;
use crate::sync::payload::PostPayload;
use crate::sync::ports::{
    MediaUpload, RawResponse, RemoteClient, RemoteMedia, RemotePost, RemoteTarget, RemoteTerm,
    TermPayload, TermQuery,
};

/// Shape of the next create/upload reply.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Resource stored, JSON object body.
    Full,
    /// Resource stored, empty body.
    Empty,
    /// Resource stored, empty body and a `Location` header.
    LocationOnly,
    /// Resource stored, list-shaped body with a decoy element first.
    List,
    /// Nothing stored, error returned.
    Fail(SyncError),
    /// Resource stored, error returned anyway (e.g. timeout after write).
    FailAfterWrite(SyncError),
}

#[derive(Debug, Default)]
struct Site {
    posts: Vec<(RemotePost, Option<PostPayload>)>,
    terms: HashMap<TaxonomyKind, Vec<RemoteTerm>>,
    media: Vec<RemoteMedia>,
}

#[derive(Debug, Default)]
struct RemoteState {
    next_id: u64,
    sites: HashMap<String, Site>,
    calls: Vec<(String, &'static str)>,
    probe_failures: HashMap<String, SyncError>,
    post_failures: HashMap<String, SyncError>,
    term_failures: HashMap<String, SyncError>,
    create_replies: VecDeque<Reply>,
    upload_replies: VecDeque<Reply>,
    post_delay: Option<Duration>,
}

impl RemoteState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn site(&mut self, target_id: &str) -> &mut Site {
        self.sites.entry(target_id.to_string()).or_default()
    }
}

/// In-memory [`RemoteClient`].
#[derive(Debug, Default)]
pub struct FakeRemote {
    state: Mutex<RemoteState>,
}

fn base_url(target_id: &str) -> String {
    format!("https://{target_id}.remote.test")
}

fn post_json(post: &RemotePost) -> serde_json::Value {
    json!({
        "id": post.id,
        "slug": post.slug,
        "title": { "rendered": post.title },
        "link": post.link,
    })
}

fn media_json(media: &RemoteMedia) -> serde_json::Value {
    json!({
        "id": media.id,
        "slug": media.slug,
        "title": { "rendered": media.title },
        "source_url": media.source_url,
    })
}

fn render(reply: &Reply, location: String, object: serde_json::Value) -> RawResponse {
    match reply {
        Reply::Empty => RawResponse::new(201, ""),
        Reply::LocationOnly => RawResponse::new(201, "").with_header("Location", location),
        Reply::List => {
            let decoy = json!({ "id": 999_999, "slug": "decoy", "source_url": "https://decoy.test/x" });
            RawResponse::new(200, json!([decoy, object]).to_string())
        }
        _ => RawResponse::new(201, object.to_string()),
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `probe` fail for one target.
    pub fn fail_probe(&self, target_id: &str, err: SyncError) {
        self.state.lock().probe_failures.insert(target_id.to_string(), err);
    }

    /// Make post create/update fail for one target.
    pub fn fail_posts(&self, target_id: &str, err: SyncError) {
        self.state.lock().post_failures.insert(target_id.to_string(), err);
    }

    /// Make creating the term with `slug` fail on every target.
    pub fn fail_term(&self, slug: &str, err: SyncError) {
        self.state.lock().term_failures.insert(slug.to_string(), err);
    }

    /// Hold every post create/update for `delay` before answering.
    pub fn delay_posts(&self, delay: Duration) {
        self.state.lock().post_delay = Some(delay);
    }

    pub fn script_create(&self, reply: Reply) {
        self.state.lock().create_replies.push_back(reply);
    }

    pub fn script_upload(&self, reply: Reply) {
        self.state.lock().upload_replies.push_back(reply);
    }

    /// Seed an existing post; returns its id.
    pub fn insert_post(&self, target_id: &str, slug: &str, title: &str) -> u64 {
        let mut state = self.state.lock();
        let id = state.next_id();
        let post = RemotePost {
            id,
            slug: slug.into(),
            title: title.into(),
            link: Some(format!("{}/?p={id}", base_url(target_id))),
        };
        state.site(target_id).posts.push((post, None));
        id
    }

    /// Seed an existing term; returns its id.
    pub fn insert_term(
        &self,
        target_id: &str,
        kind: TaxonomyKind,
        name: &str,
        slug: &str,
        parent: Option<u64>,
    ) -> u64 {
        let mut state = self.state.lock();
        let id = state.next_id();
        let term = RemoteTerm { id, name: name.into(), slug: slug.into(), parent };
        state.site(target_id).terms.entry(kind).or_default().push(term);
        id
    }

    pub fn posts(&self, target_id: &str) -> Vec<RemotePost> {
        let mut state = self.state.lock();
        state.site(target_id).posts.iter().map(|(post, _)| post.clone()).collect()
    }

    /// Last payload written to a post.
    pub fn post_payload(&self, target_id: &str, post_id: u64) -> Option<PostPayload> {
        let mut state = self.state.lock();
        state
            .site(target_id)
            .posts
            .iter()
            .find(|(post, _)| post.id == post_id)
            .and_then(|(_, payload)| payload.clone())
    }

    pub fn terms(&self, target_id: &str, kind: TaxonomyKind) -> Vec<RemoteTerm> {
        let mut state = self.state.lock();
        state.site(target_id).terms.get(&kind).cloned().unwrap_or_default()
    }

    pub fn media(&self, target_id: &str) -> Vec<RemoteMedia> {
        let mut state = self.state.lock();
        state.site(target_id).media.clone()
    }

    /// Calls to `method` across all targets.
    pub fn call_count(&self, method: &str) -> usize {
        self.state.lock().calls.iter().filter(|(_, m)| *m == method).count()
    }

    pub fn call_count_for(&self, target_id: &str, method: &str) -> usize {
        self.state.lock().calls.iter().filter(|(t, m)| t == target_id && *m == method).count()
    }

    fn record(&self, remote: &RemoteTarget, method: &'static str) {
        self.state.lock().calls.push((remote.id().to_string(), method));
    }

    fn post_failure(&self, remote: &RemoteTarget) -> Option<SyncError> {
        self.state.lock().post_failures.get(remote.id()).cloned()
    }

    async fn post_latency(&self) {
        let delay = self.state.lock().post_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RemoteClient for FakeRemote {
    async fn probe(&self, remote: &RemoteTarget) -> Result<(), SyncError> {
        self.record(remote, "probe");
        match self.state.lock().probe_failures.get(remote.id()) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn create_post(
        &self,
        remote: &RemoteTarget,
        payload: &PostPayload,
    ) -> Result<RawResponse, SyncError> {
        self.record(remote, "create_post");
        self.post_latency().await;
        if let Some(err) = self.post_failure(remote) {
            return Err(err);
        }

        let mut state = self.state.lock();
        let reply = state.create_replies.pop_front().unwrap_or(Reply::Full);
        if let Reply::Fail(err) = reply {
            return Err(err);
        }

        let id = state.next_id();
        let post = RemotePost {
            id,
            slug: payload.slug.clone(),
            title: payload.title.clone(),
            link: Some(format!("{}/?p={id}", base_url(remote.id()))),
        };
        let object = post_json(&post);
        state.site(remote.id()).posts.push((post, Some(payload.clone())));

        if let Reply::FailAfterWrite(err) = reply {
            return Err(err);
        }
        let location = format!("{}/wp-json/wp/v2/posts/{id}", base_url(remote.id()));
        Ok(render(&reply, location, object))
    }

    async fn update_post(
        &self,
        remote: &RemoteTarget,
        remote_id: u64,
        payload: &PostPayload,
    ) -> Result<RawResponse, SyncError> {
        self.record(remote, "update_post");
        self.post_latency().await;
        if let Some(err) = self.post_failure(remote) {
            return Err(err);
        }

        let mut state = self.state.lock();
        let site = state.site(remote.id());
        let Some((post, stored)) = site.posts.iter_mut().find(|(post, _)| post.id == remote_id)
        else {
            return Err(SyncError::validation(404, "rest_post_invalid_id"));
        };
        post.slug = payload.slug.clone();
        post.title = payload.title.clone();
        *stored = Some(payload.clone());
        Ok(RawResponse::new(200, post_json(post).to_string()))
    }

    async fn delete_post(&self, remote: &RemoteTarget, remote_id: u64) -> Result<(), SyncError> {
        self.record(remote, "delete_post");
        let mut state = self.state.lock();
        let site = state.site(remote.id());
        let before = site.posts.len();
        site.posts.retain(|(post, _)| post.id != remote_id);
        if site.posts.len() == before {
            return Err(SyncError::validation(404, "rest_post_invalid_id"));
        }
        Ok(())
    }

    async fn find_posts_by_slug(
        &self,
        remote: &RemoteTarget,
        slug: &str,
    ) -> Result<Vec<RemotePost>, SyncError> {
        self.record(remote, "find_posts_by_slug");
        let mut state = self.state.lock();
        Ok(state
            .site(remote.id())
            .posts
            .iter()
            .rev()
            .filter(|(post, _)| post.slug == slug)
            .map(|(post, _)| post.clone())
            .collect())
    }

    async fn search_posts(
        &self,
        remote: &RemoteTarget,
        query: &str,
    ) -> Result<Vec<RemotePost>, SyncError> {
        self.record(remote, "search_posts");
        let needle = query.to_lowercase();
        let mut state = self.state.lock();
        Ok(state
            .site(remote.id())
            .posts
            .iter()
            .rev()
            .filter(|(post, _)| post.title.to_lowercase().contains(&needle))
            .map(|(post, _)| post.clone())
            .collect())
    }

    async fn find_terms(
        &self,
        remote: &RemoteTarget,
        kind: TaxonomyKind,
        query: &TermQuery,
    ) -> Result<Vec<RemoteTerm>, SyncError> {
        self.record(remote, "find_terms");
        let mut state = self.state.lock();
        let terms = state.site(remote.id()).terms.get(&kind).cloned().unwrap_or_default();
        Ok(match query {
            TermQuery::Slug(slug) => terms.into_iter().filter(|t| &t.slug == slug).collect(),
            TermQuery::Search(text) => {
                let needle = text.to_lowercase();
                terms.into_iter().filter(|t| t.name.to_lowercase().contains(&needle)).collect()
            }
        })
    }

    async fn create_term(
        &self,
        remote: &RemoteTarget,
        kind: TaxonomyKind,
        payload: &TermPayload,
    ) -> Result<RemoteTerm, SyncError> {
        self.record(remote, "create_term");
        let mut state = self.state.lock();
        if let Some(err) = state.term_failures.get(&payload.slug) {
            return Err(err.clone());
        }
        let exists = state
            .site(remote.id())
            .terms
            .get(&kind)
            .is_some_and(|terms| terms.iter().any(|t| t.slug == payload.slug));
        if exists {
            return Err(SyncError::validation(400, "term_exists"));
        }

        let id = state.next_id();
        let term = RemoteTerm {
            id,
            name: payload.name.clone(),
            slug: payload.slug.clone(),
            parent: payload.parent,
        };
        state.site(remote.id()).terms.entry(kind).or_default().push(term.clone());
        Ok(term)
    }

    async fn upload_media(
        &self,
        remote: &RemoteTarget,
        upload: &MediaUpload,
    ) -> Result<RawResponse, SyncError> {
        self.record(remote, "upload_media");
        let mut state = self.state.lock();
        let reply = state.upload_replies.pop_front().unwrap_or(Reply::Full);
        if let Reply::Fail(err) = reply {
            return Err(err);
        }

        let id = state.next_id();
        let stem = upload
            .file_name
            .rsplit_once('.')
            .map_or(upload.file_name.as_str(), |(stem, _)| stem)
            .to_lowercase();
        let media = RemoteMedia {
            id,
            source_url: format!("{}/uploads/{}", base_url(remote.id()), upload.file_name),
            slug: stem,
            title: upload.title.clone().unwrap_or_default(),
        };
        let object = media_json(&media);
        state.site(remote.id()).media.push(media);

        if let Reply::FailAfterWrite(err) = reply {
            return Err(err);
        }
        let location = format!("{}/wp-json/wp/v2/media/{id}", base_url(remote.id()));
        Ok(render(&reply, location, object))
    }

    async fn search_media(
        &self,
        remote: &RemoteTarget,
        query: &str,
    ) -> Result<Vec<RemoteMedia>, SyncError> {
        self.record(remote, "search_media");
        let needle = query.to_lowercase();
        let mut state = self.state.lock();
        Ok(state
            .site(remote.id())
            .media
            .iter()
            .rev()
            .filter(|m| m.slug.contains(&needle) || m.title.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }
}
