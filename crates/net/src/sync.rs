//! Durable sync adapter
//!
//! Room writes are handed to a dedicated storage thread over a channel and
//! never awaited. Failures are logged and dropped; the next write for the
//! same room replaces the whole document anyway. The only read is a room
//! load at rehydration, answered through a oneshot.

use std::thread::{self, JoinHandle};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use memecard_core::{RoomRepository, RoomSnapshot};

/// Work for the storage thread
#[derive(Debug)]
pub enum SyncOp {
    Upsert(RoomSnapshot),
    Delete(String),
    Load {
        code: String,
        reply: oneshot::Sender<Option<RoomSnapshot>>,
    },
    /// Delete idle rooms created before the cutoff
    Reap { cutoff: DateTime<Utc> },
    /// Delete documents past the retention window
    Purge,
}

/// Sending side of the storage thread. The thread exits once every handle
/// is dropped and the queue is drained.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SyncOp>,
}

impl SyncHandle {
    /// Start the storage thread over `store`. Documents older than
    /// `retention` are treated as absent and purged on request.
    pub fn spawn<S>(store: S, retention: Duration) -> std::io::Result<(Self, JoinHandle<()>)>
    where
        S: RoomRepository + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = thread::Builder::new()
            .name("memecard-sync".into())
            .spawn(move || storage_loop(store, retention, rx))?;
        Ok((Self { tx }, thread))
    }

    pub fn upsert(&self, snapshot: RoomSnapshot) {
        self.submit(SyncOp::Upsert(snapshot));
    }

    pub fn delete(&self, code: &str) {
        self.submit(SyncOp::Delete(code.to_string()));
    }

    /// Request a stored room. Resolves to `None` when the room is absent,
    /// expired or storage failed.
    pub fn load(&self, code: &str) -> oneshot::Receiver<Option<RoomSnapshot>> {
        let (reply, rx) = oneshot::channel();
        self.submit(SyncOp::Load {
            code: code.to_string(),
            reply,
        });
        rx
    }

    pub fn reap(&self, cutoff: DateTime<Utc>) {
        self.submit(SyncOp::Reap { cutoff });
    }

    pub fn purge(&self) {
        self.submit(SyncOp::Purge);
    }

    fn submit(&self, op: SyncOp) {
        if self.tx.send(op).is_err() {
            warn!("Storage thread is gone; dropping write");
        }
    }
}

fn storage_loop<S: RoomRepository>(
    store: S,
    retention: Duration,
    mut rx: mpsc::UnboundedReceiver<SyncOp>,
) {
    info!("Storage thread started");

    while let Some(op) = rx.blocking_recv() {
        apply(&store, retention, op);
    }

    info!("Storage thread stopped");
}

fn apply<S: RoomRepository>(store: &S, retention: Duration, op: SyncOp) {
    match op {
        SyncOp::Upsert(snapshot) => {
            if let Err(e) = store.save_room(&snapshot) {
                warn!(room = %snapshot.code, error = %e, "Failed to persist room");
            }
        }
        SyncOp::Delete(code) => {
            if let Err(e) = store.delete_room(&code) {
                warn!(room = %code, error = %e, "Failed to delete stored room");
            }
        }
        SyncOp::Load { code, reply } => {
            let snapshot = match store.load_room(&code, Utc::now() - retention) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(room = %code, error = %e, "Failed to load room");
                    None
                }
            };
            debug!(room = %code, found = snapshot.is_some(), "Room load finished");
            let _ = reply.send(snapshot);
        }
        SyncOp::Reap { cutoff } => match store.delete_stale_rooms(cutoff) {
            Ok(0) => {}
            Ok(deleted) => info!(deleted, "Reaped stale stored rooms"),
            Err(e) => warn!(error = %e, "Failed to reap stored rooms"),
        },
        SyncOp::Purge => match store.purge_expired_rooms(Utc::now() - retention) {
            Ok(0) => {}
            Ok(deleted) => info!(deleted, "Purged expired stored rooms"),
            Err(e) => warn!(error = %e, "Failed to purge stored rooms"),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use memecard_core::{Database, Error, Player, Result, Room, RoomStatus};

    use super::*;

    /// In-memory repository recording what it was asked to do
    #[derive(Clone, Default)]
    struct Recording {
        rooms: Arc<Mutex<Vec<RoomSnapshot>>>,
        fail: bool,
    }

    impl RoomRepository for Recording {
        fn save_room(&self, snapshot: &RoomSnapshot) -> Result<()> {
            if self.fail {
                return Err(Error::Config("storage offline".into()));
            }
            let mut rooms = self.rooms.lock().unwrap();
            rooms.retain(|r| r.code != snapshot.code);
            rooms.push(snapshot.clone());
            Ok(())
        }

        fn load_room(&self, code: &str, _not_before: DateTime<Utc>) -> Result<Option<RoomSnapshot>> {
            if self.fail {
                return Err(Error::Config("storage offline".into()));
            }
            Ok(self.rooms.lock().unwrap().iter().find(|r| r.code == code).cloned())
        }

        fn delete_room(&self, code: &str) -> Result<()> {
            self.rooms.lock().unwrap().retain(|r| r.code != code);
            Ok(())
        }

        fn delete_stale_rooms(&self, _cutoff: DateTime<Utc>) -> Result<u64> {
            Ok(0)
        }

        fn purge_expired_rooms(&self, _cutoff: DateTime<Utc>) -> Result<u64> {
            Ok(0)
        }
    }

    fn room(code: &str) -> Room {
        Room::new(code, Player::host("alice", None), 8, 7)
    }

    #[tokio::test]
    async fn test_writes_then_load() {
        let store = Recording::default();
        let (sync, thread) = SyncHandle::spawn(store.clone(), Duration::hours(24)).unwrap();

        sync.upsert(room("ABC123").snapshot());
        let loaded = sync.load("ABC123").await.unwrap();
        assert_eq!(loaded.map(|r| r.code), Some("ABC123".to_string()));

        sync.delete("ABC123");
        assert!(sync.load("ABC123").await.unwrap().is_none());

        drop(sync);
        thread.join().unwrap();
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let store = Recording {
            fail: true,
            ..Default::default()
        };
        let (sync, thread) = SyncHandle::spawn(store, Duration::hours(24)).unwrap();

        sync.upsert(room("ABC123").snapshot());
        assert!(sync.load("ABC123").await.unwrap().is_none());

        drop(sync);
        thread.join().unwrap();
    }

    #[tokio::test]
    async fn test_queued_writes_drain_on_shutdown() {
        let store = Recording::default();
        let (sync, thread) = SyncHandle::spawn(store.clone(), Duration::hours(24)).unwrap();

        for i in 0..50 {
            sync.upsert(room(&format!("ROOM{i:02}")).snapshot());
        }
        drop(sync);
        thread.join().unwrap();

        assert_eq!(store.rooms.lock().unwrap().len(), 50);
    }

    #[tokio::test]
    async fn test_sqlite_backed_reap() {
        let (sync, thread) =
            SyncHandle::spawn(Database::open_in_memory().unwrap(), Duration::hours(24)).unwrap();

        let mut old = room("OLD123");
        old.status = RoomStatus::Finished;
        old.created_at = Utc::now() - Duration::hours(2);
        sync.upsert(old.snapshot());
        sync.upsert(room("NEW123").snapshot());
        sync.reap(Utc::now() - Duration::minutes(30));
        sync.purge();

        assert!(sync.load("OLD123").await.unwrap().is_none());
        assert!(sync.load("NEW123").await.unwrap().is_some());

        drop(sync);
        thread.join().unwrap();
    }
}
