//! Filesystem-backed content and media sources.
//!
//! Layout under the content root:
//!
//! ```text
//! <root>/items/<item id>.json        ContentItem snapshots
//! <root>/terms/<taxonomy>.json       arrays of TermRef (category.json, tag.json)
//! <root>/media/...                   local copies of remote-hosted media
//! ```

pub mod items;
pub mod media;

pub use items::FsContentSource;
pub use media::FsMediaSource;
