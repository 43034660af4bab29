//! Storage repository traits
//!
//! These traits define the storage interface the room engine writes
//! through, allowing for different implementations (SQLite, mock).

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Caption, Card, RoomSnapshot};

/// Durable room documents
pub trait RoomRepository {
    /// Insert or replace a room document
    fn save_room(&self, snapshot: &RoomSnapshot) -> Result<()>;

    /// Load a room created at or after `not_before`
    fn load_room(&self, code: &str, not_before: DateTime<Utc>) -> Result<Option<RoomSnapshot>>;

    /// Delete a room; absent rooms are not an error
    fn delete_room(&self, code: &str) -> Result<()>;

    /// Delete waiting or finished rooms created before `cutoff`
    fn delete_stale_rooms(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Delete every room created before `cutoff`
    fn purge_expired_rooms(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Content library
pub trait LibraryRepository {
    fn add_card(&self, card: &Card) -> Result<()>;

    fn add_caption(&self, caption: &Caption) -> Result<()>;

    fn list_active_cards(&self) -> Result<Vec<Card>>;

    fn list_active_captions(&self) -> Result<Vec<Caption>>;
}

/// Combined storage trait for convenience
pub trait Storage: RoomRepository + LibraryRepository {}

// Blanket implementation for any type that implements all repository traits
impl<T> Storage for T where T: RoomRepository + LibraryRepository {}
