//! Background history writes
//!
//! Every session change produces a full snapshot of the message list. Saving
//! each one inline would put file I/O on the async runtime once per streamed
//! delta, so snapshots are queued to a writer task that saves on the blocking
//! pool. Only the newest queued snapshot is written; older ones it replaces
//! are skipped.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::history::HistoryStore;
use super::message::Message;

/// Snapshot tagged with the session version it was taken at
type Snapshot = (u64, Vec<Message>);

pub(crate) struct HistoryWriter {
    store: Arc<dyn HistoryStore>,
    /// `None` when no runtime was available; snapshots are then saved inline
    queued: Option<watch::Sender<Snapshot>>,
    written: watch::Receiver<u64>,
}

impl HistoryWriter {
    pub(crate) fn start(store: Arc<dyn HistoryStore>) -> Self {
        let (written_tx, written) = watch::channel(0);

        let queued = match Handle::try_current() {
            Ok(handle) => {
                let (queued, rx) = watch::channel((0, Vec::new()));
                handle.spawn(write_loop(Arc::clone(&store), rx, written_tx));
                Some(queued)
            }
            Err(_) => {
                debug!("No async runtime, chat history will be saved inline");
                None
            }
        };

        Self {
            store,
            queued,
            written,
        }
    }

    /// Queue the snapshot taken at `version`
    pub(crate) fn submit(&self, version: u64, messages: Vec<Message>) {
        match &self.queued {
            Some(queued) => {
                queued.send_replace((version, messages));
            }
            None => save_logged(self.store.as_ref(), &messages),
        }
    }

    /// Wait until every snapshot up to `version` has been written
    pub(crate) async fn flush(&self, version: u64) {
        if self.queued.is_none() {
            return;
        }
        let mut written = self.written.clone();
        // Err means the writer task is gone and nothing more will be written
        let _ = written.wait_for(|saved| *saved >= version).await;
    }
}

async fn write_loop(
    store: Arc<dyn HistoryStore>,
    mut queued: watch::Receiver<Snapshot>,
    written: watch::Sender<u64>,
) {
    while queued.changed().await.is_ok() {
        let (version, messages) = queued.borrow_and_update().clone();

        let target = Arc::clone(&store);
        let saved =
            tokio::task::spawn_blocking(move || save_logged(target.as_ref(), &messages)).await;
        if let Err(e) = saved {
            warn!(error = %e, "History write task failed");
        }
        written.send_replace(version);
    }
    debug!("History writer stopped");
}

fn save_logged(store: &dyn HistoryStore, messages: &[Message]) {
    if let Err(e) = store.save(messages) {
        warn!(error = %e, "Failed to persist chat history");
    }
}
