//! HTTP execution layer and the REST adapter built on it.

pub mod client;
pub mod dto;
pub mod policy;
pub mod rest_client;

pub use client::{classify_status, classify_transport, host_key, HttpClient, HttpClientBuilder};
pub use policy::{parse_retry_after, upload_timeout, RequestPolicy};
pub use rest_client::{RestClientConfig, RestRemoteClient, DEFAULT_API_PATH};
