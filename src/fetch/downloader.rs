//! Consumer side of the texture fetch queue.
//!
//! A dedicated tokio runtime drains the queue and runs fetches on the
//! blocking pool with bounded concurrency. The worker stops once every
//! producer has sent its quit marker or all senders are gone.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::core::{Error, Result};
use crate::geo::TextureKey;

use super::queue::{FetchQueue, FetchRequest};

/// Something that can produce the texture for a key.
pub trait TextureSource: Send + Sync + 'static {
    fn fetch(&self, key: &TextureKey) -> Result<()>;
}

/// Outcome counters of a downloader run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub fetched: usize,
    pub failed: usize,
    pub duplicates: usize,
}

/// Background texture downloader owning its runtime.
pub struct TextureDownloader {
    queue: FetchQueue,
    handle: JoinHandle<DownloadStats>,
    runtime: Runtime,
}

impl TextureDownloader {
    /// Start a downloader for `producers` queue producers.
    pub fn spawn<S: TextureSource>(source: Arc<S>, max_concurrent: usize, producers: usize) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("texture-fetch")
            .enable_all()
            .build()?;
        let (queue, rx) = FetchQueue::channel();
        let handle = runtime.spawn(Self::worker_loop(source, max_concurrent.max(1), producers, rx));
        Ok(Self { queue, handle, runtime })
    }

    /// A producer handle for the queue.
    pub fn queue(&self) -> FetchQueue {
        self.queue.clone()
    }

    /// Runtime the downloader runs on, for auxiliary tasks such as signal handling.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Wait for the worker to drain the queue.
    pub fn join(self) -> Result<DownloadStats> {
        let Self { queue, handle, runtime } = self;
        drop(queue);
        runtime
            .block_on(handle)
            .map_err(|e| Error::Fetch(format!("downloader task failed: {e}")))
    }

    async fn worker_loop<S: TextureSource>(
        source: Arc<S>,
        max_concurrent: usize,
        producers: usize,
        mut request_rx: mpsc::UnboundedReceiver<FetchRequest>,
    ) -> DownloadStats {
        let mut stats = DownloadStats::default();
        let mut active: JoinSet<(TextureKey, Result<()>)> = JoinSet::new();
        let mut pending: VecDeque<TextureKey> = VecDeque::new();
        let mut seen: HashSet<TextureKey> = HashSet::new();
        let mut quits = 0;
        let mut open = true;

        loop {
            while active.len() < max_concurrent {
                let Some(key) = pending.pop_front() else { break };
                let source = source.clone();
                active.spawn_blocking(move || {
                    let result = source.fetch(&key);
                    (key, result)
                });
            }

            if !open && pending.is_empty() && active.is_empty() {
                break;
            }

            tokio::select! {
                request = request_rx.recv(), if open => match request {
                    Some(FetchRequest::Texture(key)) => {
                        if seen.insert(key.clone()) {
                            pending.push_back(key);
                        } else {
                            stats.duplicates += 1;
                        }
                    }
                    Some(FetchRequest::Quit) => {
                        quits += 1;
                        open = quits < producers;
                    }
                    None => open = false,
                },

                Some(joined) = active.join_next(), if !active.is_empty() => match joined {
                    Ok((key, Ok(()))) => {
                        log::debug!("Fetched texture {}", key);
                        stats.fetched += 1;
                    }
                    Ok((key, Err(e))) => {
                        log::warn!("Texture {} failed: {}", key, e);
                        stats.failed += 1;
                    }
                    Err(e) => {
                        log::error!("Texture fetch task panicked: {}", e);
                        stats.failed += 1;
                    }
                },

                else => break,
            }
        }

        log::info!(
            "Texture downloader done: {} fetched, {} failed, {} duplicate requests",
            stats.fetched, stats.failed, stats.duplicates
        );
        stats
    }
}

/// Records requested textures so an external tool can fetch them later.
#[derive(Debug, Default)]
pub struct ManifestSource {
    keys: Mutex<BTreeSet<TextureKey>>,
}

impl ManifestSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requested keys in order.
    pub fn keys(&self) -> Vec<TextureKey> {
        match self.keys.lock() {
            Ok(keys) => keys.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    /// Write the manifest as a JSON array.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.keys())?;
        std::fs::write(path, json)?;
        log::info!("Wrote {} pending textures to {}", self.keys().len(), path.display());
        Ok(())
    }
}

impl TextureSource for ManifestSource {
    fn fetch(&self, key: &TextureKey) -> Result<()> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| Error::Fetch("manifest lock poisoned".to_string()))?;
        keys.insert(key.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FlakySource {
        calls: AtomicUsize,
    }

    impl TextureSource for FlakySource {
        fn fetch(&self, key: &TextureKey) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if key.til_x == 0 {
                Err(Error::Fetch("provider unavailable".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_downloader_drains_until_quit() {
        let source = Arc::new(FlakySource { calls: AtomicUsize::new(0) });
        let downloader = TextureDownloader::spawn(source.clone(), 2, 1).unwrap();
        let queue = downloader.queue();
        for x in 0..5 {
            queue.request(TextureKey::new(x * 16, 0, 16, "BI"));
        }
        queue.request(TextureKey::new(16, 0, 16, "BI"));
        queue.finish();

        let stats = downloader.join().unwrap();
        assert_eq!(stats.fetched, 4);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_downloader_waits_for_all_producers() {
        let source = Arc::new(ManifestSource::new());
        let downloader = TextureDownloader::spawn(source.clone(), 4, 2).unwrap();
        let first = downloader.queue();
        let second = downloader.queue();
        first.request(TextureKey::new(16, 16, 17, "GO2"));
        first.finish();
        second.request(TextureKey::new(32, 16, 17, "GO2"));
        second.finish();

        let stats = downloader.join().unwrap();
        assert_eq!(stats.fetched, 2);
        assert_eq!(source.keys().len(), 2);
    }

    #[test]
    fn test_downloader_stops_when_senders_dropped() {
        let source = Arc::new(ManifestSource::new());
        let downloader = TextureDownloader::spawn(source, 1, 3).unwrap();
        let queue = downloader.queue();
        queue.request(TextureKey::new(0, 0, 16, "BI"));
        drop(queue);
        let stats = downloader.join().unwrap();
        assert_eq!(stats.fetched, 1);
    }

    #[test]
    fn test_manifest_written_sorted() {
        let dir = TempDir::new().unwrap();
        let manifest = ManifestSource::new();
        manifest.fetch(&TextureKey::new(48, 0, 16, "BI")).unwrap();
        manifest.fetch(&TextureKey::new(16, 0, 16, "BI")).unwrap();
        manifest.fetch(&TextureKey::new(16, 0, 16, "BI")).unwrap();

        let path = dir.path().join("textures").join("pending_textures.json");
        manifest.write(&path).unwrap();
        let keys: Vec<TextureKey> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].til_x, 16);
    }
}
