//! Producer side of the texture fetch queue.

use tokio::sync::mpsc;

use crate::geo::TextureKey;

/// Work item consumed by the texture downloader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    /// Fetch (or refresh) the texture of this key
    Texture(TextureKey),
    /// One producer finished scanning
    Quit,
}

/// Cloneable, non-blocking handle for pushing fetch requests.
#[derive(Debug, Clone)]
pub struct FetchQueue {
    tx: mpsc::UnboundedSender<FetchRequest>,
}

impl FetchQueue {
    /// Create a queue and the receiver a downloader drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FetchRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A queue with no consumer. Requests are dropped.
    pub fn detached() -> Self {
        Self::channel().0
    }

    /// Push a texture request. Returns `false` if no consumer is listening.
    pub fn request(&self, key: TextureKey) -> bool {
        match self.tx.send(FetchRequest::Texture(key)) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Texture queue closed, dropping request {:?}", e.0);
                false
            }
        }
    }

    /// Signal that this producer is done.
    pub fn finish(&self) {
        let _ = self.tx.send(FetchRequest::Quit);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
