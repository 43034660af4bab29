//! SQLite storage layer for room documents and the content library

mod library;
mod migrations;
mod parse;
mod rooms;
mod traits;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use tracing::instrument;

use crate::error::Result;
use crate::models::{Caption, Card, RoomSnapshot};

pub use library::{LibraryFile, LibraryStore};
pub use rooms::RoomStore;
pub use traits::{LibraryRepository, RoomRepository, Storage};

/// Main database handle
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initialize database schema via migrations
    fn init(&self) -> Result<()> {
        migrations::run_migrations(&self.conn)?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    /// Get room document store
    pub fn rooms(&self) -> RoomStore<'_> {
        RoomStore::new(&self.conn)
    }

    /// Get meme template and caption store
    pub fn library(&self) -> LibraryStore<'_> {
        LibraryStore::new(&self.conn)
    }
}

// Implement repository traits for Database
// This enables using Database through the trait interface

impl RoomRepository for Database {
    fn save_room(&self, snapshot: &RoomSnapshot) -> Result<()> {
        self.rooms().upsert(snapshot)
    }

    fn load_room(&self, code: &str, not_before: DateTime<Utc>) -> Result<Option<RoomSnapshot>> {
        self.rooms().find_by_code(code, not_before)
    }

    fn delete_room(&self, code: &str) -> Result<()> {
        self.rooms().delete(code).map(|_| ())
    }

    fn delete_stale_rooms(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.rooms().delete_stale(cutoff)
    }

    fn purge_expired_rooms(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.rooms().purge_expired(cutoff)
    }
}

impl LibraryRepository for Database {
    fn add_card(&self, card: &Card) -> Result<()> {
        self.library().upsert_card(card)
    }

    fn add_caption(&self, caption: &Caption) -> Result<()> {
        self.library().upsert_caption(caption)
    }

    fn list_active_cards(&self) -> Result<Vec<Card>> {
        self.library().active_cards()
    }

    fn list_active_captions(&self) -> Result<Vec<Caption>> {
        self.library().active_captions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Player, Room};

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memecard.db");

        {
            let db = Database::open(&path).unwrap();
            let room = Room::new("ABC123", Player::host("alice", None), 8, 7);
            db.save_room(&room.snapshot()).unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert!(db.schema_version() >= 2);
        let found = db
            .load_room("ABC123", Utc::now() - chrono::Duration::hours(1))
            .unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn test_repository_through_trait() {
        fn use_storage<S: Storage>(storage: &S) -> Result<usize> {
            storage.add_card(&Card::new("c1", "c1.png"))?;
            storage.add_caption(&Caption::new("p1", "prompt"))?;
            Ok(storage.list_active_cards()?.len() + storage.list_active_captions()?.len())
        }

        let db = Database::open_in_memory().unwrap();
        assert_eq!(use_storage(&db).unwrap(), 2);
    }
}
