//! Texture fetch queue shared between the terrain classifier and a
//! background downloader.

pub mod queue;
pub mod downloader;

pub use queue::{FetchQueue, FetchRequest};
pub use downloader::{DownloadStats, ManifestSource, TextureDownloader, TextureSource};

/// Manifest of requested textures inside the textures directory.
pub const MANIFEST_FILE: &str = "pending_textures.json";
