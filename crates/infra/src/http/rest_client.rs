//! [`RemoteClient`] over the remote REST content API.

use std::time::Duration;

use async_trait::async_trait;
use relaypost_common::BackoffPolicy;
use relaypost_core::{
    MediaUpload, PostPayload, RawResponse, RemoteClient, RemoteMedia, RemotePost, RemoteTarget,
    RemoteTerm, SyncError, TermPayload, TermQuery,
};
use relaypost_domain::{ApiSettings, TaxonomyKind};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::instrument;

use super::client::HttpClient;
use super::dto::{MediaDto, PostDto, TermDto};
use super::policy::RequestPolicy;

pub const DEFAULT_API_PATH: &str = "wp-json/wp/v2";
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const SEARCH_PAGE_SIZE: u32 = 20;
const TERM_PAGE_SIZE: u32 = 100;

/// Knobs of the REST adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct RestClientConfig {
    /// Path of the API root below each target's base URL.
    pub api_path: String,
    pub max_attempts: u32,
    /// Timeout of non-upload calls.
    pub timeout: Duration,
    pub post_backoff: BackoffPolicy,
    pub media_backoff: BackoffPolicy,
}

impl Default for RestClientConfig {
    fn default() -> Self {
        Self::from_settings(&ApiSettings::default())
    }
}

impl RestClientConfig {
    pub fn from_settings(api: &ApiSettings) -> Self {
        Self {
            api_path: DEFAULT_API_PATH.to_string(),
            max_attempts: api.retries.max(1),
            timeout: Duration::from_secs(api.timeout.max(1)),
            post_backoff: BackoffPolicy::posts(),
            media_backoff: BackoffPolicy::media(),
        }
    }

    fn post_policy(&self) -> RequestPolicy {
        RequestPolicy::posts(self.max_attempts, self.timeout).with_backoff(self.post_backoff)
    }

    fn media_policy(&self, bytes: u64) -> RequestPolicy {
        RequestPolicy::media(self.max_attempts, bytes).with_backoff(self.media_backoff)
    }
}

/// Authenticated REST client shared by every target.
#[derive(Clone)]
pub struct RestRemoteClient {
    http: HttpClient,
    config: RestClientConfig,
}

impl RestRemoteClient {
    pub fn new(http: HttpClient, config: RestClientConfig) -> Self {
        Self { http, config }
    }

    fn endpoint(&self, remote: &RemoteTarget, path: &str) -> String {
        format!(
            "{}/{}/{}",
            remote.target.base_url.trim_end_matches('/'),
            self.config.api_path.trim_matches('/'),
            path
        )
    }

    fn authed(&self, method: Method, remote: &RemoteTarget, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.endpoint(remote, path))
            .basic_auth(&remote.credentials.username, Some(&remote.credentials.app_password))
    }

    async fn list<T, R>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<Vec<R>, SyncError>
    where
        T: DeserializeOwned,
        R: From<T>,
    {
        let response = self.http.execute(builder, &self.config.post_policy()).await?;
        let items: Vec<T> = decode(&response, what)?;
        Ok(items.into_iter().map(R::from).collect())
    }
}

fn decode<T: DeserializeOwned>(response: &RawResponse, what: &str) -> Result<T, SyncError> {
    serde_json::from_str(&response.body).map_err(|err| {
        SyncError::AmbiguousResponse(format!(
            "malformed {what} response (status {}): {err}",
            response.status
        ))
    })
}

#[async_trait]
impl RemoteClient for RestRemoteClient {
    #[instrument(skip(self, remote), fields(target_id = %remote.id()))]
    async fn probe(&self, remote: &RemoteTarget) -> Result<(), SyncError> {
        let policy = self.config.post_policy().with_timeout(PROBE_TIMEOUT);
        let builder =
            self.authed(Method::GET, remote, "users/me").query(&[("context", "edit")]);
        self.http.execute(builder, &policy).await.map(|_| ())
    }

    #[instrument(skip(self, remote, payload), fields(target_id = %remote.id(), slug = %payload.slug))]
    async fn create_post(
        &self,
        remote: &RemoteTarget,
        payload: &PostPayload,
    ) -> Result<RawResponse, SyncError> {
        let builder = self.authed(Method::POST, remote, "posts").json(payload);
        self.http.execute(builder, &self.config.post_policy()).await
    }

    #[instrument(skip(self, remote, payload), fields(target_id = %remote.id()))]
    async fn update_post(
        &self,
        remote: &RemoteTarget,
        remote_id: u64,
        payload: &PostPayload,
    ) -> Result<RawResponse, SyncError> {
        let builder =
            self.authed(Method::POST, remote, &format!("posts/{remote_id}")).json(payload);
        self.http.execute(builder, &self.config.post_policy()).await
    }

    #[instrument(skip(self, remote), fields(target_id = %remote.id()))]
    async fn delete_post(&self, remote: &RemoteTarget, remote_id: u64) -> Result<(), SyncError> {
        let builder = self
            .authed(Method::DELETE, remote, &format!("posts/{remote_id}"))
            .query(&[("force", "true")]);
        self.http.execute(builder, &self.config.post_policy()).await.map(|_| ())
    }

    async fn find_posts_by_slug(
        &self,
        remote: &RemoteTarget,
        slug: &str,
    ) -> Result<Vec<RemotePost>, SyncError> {
        let builder = self.authed(Method::GET, remote, "posts").query(&[
            ("slug", slug),
            ("status", "any"),
            ("orderby", "date"),
            ("order", "desc"),
        ]);
        self.list::<PostDto, _>(builder, "post list").await
    }

    async fn search_posts(
        &self,
        remote: &RemoteTarget,
        query: &str,
    ) -> Result<Vec<RemotePost>, SyncError> {
        let builder = self
            .authed(Method::GET, remote, "posts")
            .query(&[("search", query), ("status", "any")])
            .query(&[("per_page", SEARCH_PAGE_SIZE)]);
        self.list::<PostDto, _>(builder, "post search").await
    }

    async fn find_terms(
        &self,
        remote: &RemoteTarget,
        kind: TaxonomyKind,
        query: &TermQuery,
    ) -> Result<Vec<RemoteTerm>, SyncError> {
        let (field, value) = match query {
            TermQuery::Slug(slug) => ("slug", slug.as_str()),
            TermQuery::Search(name) => ("search", name.as_str()),
        };
        let builder = self
            .authed(Method::GET, remote, kind.rest_base())
            .query(&[(field, value), ("hide_empty", "false")])
            .query(&[("per_page", TERM_PAGE_SIZE)]);
        self.list::<TermDto, _>(builder, "term list").await
    }

    #[instrument(skip(self, remote, payload), fields(target_id = %remote.id(), slug = %payload.slug))]
    async fn create_term(
        &self,
        remote: &RemoteTarget,
        kind: TaxonomyKind,
        payload: &TermPayload,
    ) -> Result<RemoteTerm, SyncError> {
        let builder = self.authed(Method::POST, remote, kind.rest_base()).json(payload);
        let response = self.http.execute(builder, &self.config.post_policy()).await?;
        decode::<TermDto>(&response, "term").map(RemoteTerm::from)
    }

    #[instrument(
        skip(self, remote, upload),
        fields(target_id = %remote.id(), file = %upload.file_name, bytes = upload.bytes.len())
    )]
    async fn upload_media(
        &self,
        remote: &RemoteTarget,
        upload: &MediaUpload,
    ) -> Result<RawResponse, SyncError> {
        let mut builder = self
            .authed(Method::POST, remote, "media")
            .header(CONTENT_TYPE, upload.content_type.as_str())
            .header(
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", upload.file_name.replace('"', "")),
            )
            .body(upload.bytes.clone());
        if let Some(title) = &upload.title {
            builder = builder.query(&[("title", title.as_str())]);
        }
        if let Some(alt_text) = &upload.alt_text {
            builder = builder.query(&[("alt_text", alt_text.as_str())]);
        }
        let policy = self.config.media_policy(upload.bytes.len() as u64);
        self.http.execute(builder, &policy).await
    }

    async fn search_media(
        &self,
        remote: &RemoteTarget,
        query: &str,
    ) -> Result<Vec<RemoteMedia>, SyncError> {
        let builder = self
            .authed(Method::GET, remote, "media")
            .query(&[("search", query)])
            .query(&[("per_page", SEARCH_PAGE_SIZE)]);
        self.list::<MediaDto, _>(builder, "media search").await
    }
}
