//! Wire shapes of the remote content API.
//!
//! Only the fields the engine reads are modelled. Titles arrive either as
//! `{"rendered": "..."}` objects or as plain strings depending on context.

use relaypost_core::{RemoteMedia, RemotePost, RemoteTerm};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
pub enum Text {
    Rendered { rendered: String },
    Plain(String),
    #[default]
    Missing,
}

impl Text {
    pub fn into_string(self) -> String {
        match self {
            Self::Rendered { rendered } | Self::Plain(rendered) => decode_entities(&rendered),
            Self::Missing => String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostDto {
    pub id: u64,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub title: Text,
    #[serde(default)]
    pub link: Option<String>,
}

impl From<PostDto> for RemotePost {
    fn from(dto: PostDto) -> Self {
        Self { id: dto.id, slug: dto.slug, title: dto.title.into_string(), link: dto.link }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TermDto {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    /// Zero means "no parent".
    #[serde(default)]
    pub parent: u64,
}

impl From<TermDto> for RemoteTerm {
    fn from(dto: TermDto) -> Self {
        Self {
            id: dto.id,
            name: decode_entities(&dto.name),
            slug: dto.slug,
            parent: (dto.parent != 0).then_some(dto.parent),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaDto {
    pub id: u64,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub title: Text,
}

impl From<MediaDto> for RemoteMedia {
    fn from(dto: MediaDto) -> Self {
        Self {
            id: dto.id,
            source_url: dto.source_url,
            slug: dto.slug,
            title: dto.title.into_string(),
        }
    }
}

/// Undo the handful of entities the API applies to rendered text.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&#8217;", "\u{2019}")
        .replace("&#8216;", "\u{2018}")
        .replace("&#8220;", "\u{201c}")
        .replace("&#8221;", "\u{201d}")
        .replace("&#8211;", "\u{2013}")
        .replace("&#038;", "&")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
