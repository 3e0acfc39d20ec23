use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use huddle_db::Database;

struct PendingLine {
    sender_id: Uuid,
    text: String,
}

/// Stores lobby chat lines in the order they were broadcast.
///
/// Lines are queued without waiting; a single worker thread writes them one
/// at a time. Write failures are logged and dropped. The worker exits once
/// every handle is gone.
#[derive(Clone)]
pub struct ChatArchiver {
    tx: mpsc::UnboundedSender<PendingLine>,
}

impl ChatArchiver {
    pub fn new(db: Arc<Database>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PendingLine>();

        let spawned = std::thread::Builder::new()
            .name("chat-archiver".into())
            .spawn(move || {
                while let Some(line) = rx.blocking_recv() {
                    match db.archive_chat_message(&line.sender_id.to_string(), &line.text) {
                        Ok(id) => debug!("Archived lobby message {}", id),
                        Err(e) => warn!("Failed to archive chat message from {}: {}", line.sender_id, e),
                    }
                }
            });
        if let Err(e) = spawned {
            warn!("Could not start chat archiver, lobby chat will not be stored: {}", e);
        }

        Self { tx }
    }

    /// Queue a line for storage.
    pub fn submit(&self, sender_id: Uuid, text: String) {
        if self.tx.send(PendingLine { sender_id, text }).is_err() {
            warn!("Chat archiver is gone, dropping line from {}", sender_id);
        }
    }
}
