//! Chat session - one user's view of the broadcast bus
//!
//! - `system` join/leave notices
//! - own messages filtered out of the callback
//! - file share notices carrying `FileInfo`

use crate::bus::BroadcastBus;
use lanchat_core::{Envelope, FileInfo, Result};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub struct ChatSession {
    bus: Arc<BroadcastBus>,
    username: String,
    shared_dir: PathBuf,
}

impl ChatSession {
    pub fn new(bus: Arc<BroadcastBus>, username: impl Into<String>, shared_dir: impl Into<PathBuf>) -> Self {
        Self {
            bus,
            username: username.into(),
            shared_dir: shared_dir.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Start receiving and announce ourselves.
    ///
    /// `on_message` sees everything except envelopes sent under our own name.
    pub async fn join<F>(&self, on_message: F) -> Result<()>
    where
        F: Fn(Envelope, SocketAddr) + Send + Sync + 'static,
    {
        let me = self.username.clone();
        self.bus
            .start(move |envelope, source| {
                if envelope.sender == me {
                    return;
                }
                on_message(envelope, source);
            })
            .await?;

        // A lost notice is logged by the bus, the session is up regardless
        self.bus
            .broadcast(&Envelope::system(format!("{} joined the chat", self.username)))
            .await;
        info!("💬 Joined chat as {}", self.username);
        Ok(())
    }

    pub async fn say(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        self.bus.try_broadcast(&Envelope::text(&self.username, text)).await?;
        Ok(())
    }

    /// Put `path` into the shared dir and tell everyone it can be downloaded
    pub async fn share_file(&self, path: &Path) -> Result<FileInfo> {
        let info = FileInfo::from_path(path)?;

        tokio::fs::create_dir_all(&self.shared_dir).await?;
        let dest = self.shared_dir.join(&info.name);
        if !same_file(path, &dest) {
            tokio::fs::copy(path, &dest).await?;
            debug!("Copied {} into {}", path.display(), self.shared_dir.display());
        }

        self.bus
            .try_broadcast(&Envelope::file_notice(&self.username, info.clone()))
            .await?;
        info!(file = %info.name, size = info.size_bytes, "📎 Shared file");
        Ok(info)
    }

    /// Say goodbye and stop delivering to the `join` callback.
    ///
    /// The bus itself keeps running; stopping it is the owner's call.
    pub async fn leave(&self) {
        let notice = Envelope::system(format!("{} left the chat", self.username));
        if let Err(e) = self.bus.try_broadcast(&notice).await {
            debug!("Leave notice not sent: {}", e);
        }
        self.bus.detach();
        info!("👋 Left chat");
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
