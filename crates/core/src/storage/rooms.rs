//! Room document storage
//!
//! One row per room holding the player list as JSON. Only membership,
//! scores, hands and status are durable; round state lives in memory.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::instrument;

use super::parse::{format_datetime, parse_datetime, parse_json, parse_status, OptionalExt};
use crate::error::Result;
use crate::models::RoomSnapshot;

pub struct RoomStore<'a> {
    conn: &'a Connection,
}

impl<'a> RoomStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert or replace a room document. `created_at` is kept from the
    /// first write.
    #[instrument(skip(self, snapshot), fields(code = %snapshot.code, players = snapshot.players.len()))]
    pub fn upsert(&self, snapshot: &RoomSnapshot) -> Result<()> {
        let players = serde_json::to_string(&snapshot.players)?;
        self.conn.execute(
            "INSERT INTO rooms (code, players, status, max_players, win_score, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(code) DO UPDATE SET
                players = excluded.players,
                status = excluded.status,
                max_players = excluded.max_players,
                win_score = excluded.win_score,
                updated_at = excluded.updated_at",
            params![
                snapshot.code,
                players,
                snapshot.status.as_str(),
                snapshot.max_players as i64,
                snapshot.win_score,
                format_datetime(&snapshot.created_at),
                format_datetime(&snapshot.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Find a room created at or after `not_before`. Older rows are
    /// treated as absent even if the purge has not run yet.
    #[instrument(skip(self))]
    pub fn find_by_code(&self, code: &str, not_before: DateTime<Utc>) -> Result<Option<RoomSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT code, players, status, max_players, win_score, created_at, updated_at
             FROM rooms WHERE code = ?1 AND created_at >= ?2",
        )?;

        let room = stmt
            .query_row(params![code, format_datetime(&not_before)], row_to_snapshot)
            .optional()?;

        Ok(room)
    }

    /// Delete a room. Deleting an absent room is not an error.
    #[instrument(skip(self))]
    pub fn delete(&self, code: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM rooms WHERE code = ?1", params![code])?;
        Ok(deleted > 0)
    }

    /// Delete waiting or finished rooms created before `cutoff`
    #[instrument(skip(self))]
    pub fn delete_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let deleted = self.conn.execute(
            "DELETE FROM rooms WHERE status IN ('waiting', 'finished') AND created_at < ?1",
            params![format_datetime(&cutoff)],
        )?;
        Ok(deleted as u64)
    }

    /// Delete every room created before `cutoff`, whatever its status
    #[instrument(skip(self))]
    pub fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let deleted = self.conn.execute(
            "DELETE FROM rooms WHERE created_at < ?1",
            params![format_datetime(&cutoff)],
        )?;
        Ok(deleted as u64)
    }

    /// Number of stored rooms
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM rooms", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<RoomSnapshot> {
    Ok(RoomSnapshot {
        code: row.get(0)?,
        players: parse_json(1, &row.get::<_, String>(1)?)?,
        status: parse_status(&row.get::<_, String>(2)?)?,
        max_players: row.get::<_, i64>(3)? as usize,
        win_score: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?)?,
        updated_at: parse_datetime(&row.get::<_, String>(6)?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::{Player, Room, RoomStatus};
    use crate::storage::Database;

    fn room(code: &str) -> Room {
        let mut room = Room::new(code, Player::host("alice", None), 8, 7);
        room.players.push(Player::new("bob", None));
        room
    }

    fn long_ago() -> DateTime<Utc> {
        Utc::now() - Duration::days(1)
    }

    #[test]
    fn test_upsert_and_find() {
        let db = Database::open_in_memory().unwrap();
        let store = db.rooms();

        let mut room = room("ABC123");
        room.players[1].score = 3;
        store.upsert(&room.snapshot()).unwrap();

        let found = store.find_by_code("ABC123", long_ago()).unwrap().unwrap();
        assert_eq!(found.code, "ABC123");
        assert_eq!(found.players.len(), 2);
        assert_eq!(found.players[1].score, 3);
        assert!(found.players[0].is_host);
        assert_eq!(found.status, RoomStatus::Waiting);
        assert!(found.players.iter().all(|p| p.conn.is_none()));
    }

    #[test]
    fn test_upsert_replaces_players_and_status() {
        let db = Database::open_in_memory().unwrap();
        let store = db.rooms();

        let mut room = room("ABC123");
        store.upsert(&room.snapshot()).unwrap();

        room.players.pop();
        room.status = RoomStatus::Finished;
        store.upsert(&room.snapshot()).unwrap();

        let found = store.find_by_code("ABC123", long_ago()).unwrap().unwrap();
        assert_eq!(found.players.len(), 1);
        assert_eq!(found.status, RoomStatus::Finished);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_find_missing() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.rooms().find_by_code("NOPE00", long_ago()).unwrap().is_none());
    }

    #[test]
    fn test_find_ignores_rows_past_retention() {
        let db = Database::open_in_memory().unwrap();
        let store = db.rooms();

        let mut room = room("OLD123");
        room.created_at = Utc::now() - Duration::hours(30);
        store.upsert(&room.snapshot()).unwrap();

        let cutoff = Utc::now() - Duration::hours(24);
        assert!(store.find_by_code("OLD123", cutoff).unwrap().is_none());
        assert!(store
            .find_by_code("OLD123", cutoff - Duration::hours(12))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let store = db.rooms();
        store.upsert(&room("ABC123").snapshot()).unwrap();

        assert!(store.delete("ABC123").unwrap());
        assert!(!store.delete("ABC123").unwrap());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_delete_stale_skips_playing_rooms() {
        let db = Database::open_in_memory().unwrap();
        let store = db.rooms();
        let old = Utc::now() - Duration::hours(1);

        for (code, status) in [
            ("WAIT01", RoomStatus::Waiting),
            ("PLAY01", RoomStatus::Playing),
            ("DONE01", RoomStatus::Finished),
        ] {
            let mut room = room(code);
            room.status = status;
            room.created_at = old;
            store.upsert(&room.snapshot()).unwrap();
        }
        store.upsert(&room("FRESH1").snapshot()).unwrap();

        let cutoff = Utc::now() - Duration::minutes(30);
        assert_eq!(store.delete_stale(cutoff).unwrap(), 2);
        assert!(store.find_by_code("PLAY01", long_ago()).unwrap().is_some());
        assert!(store.find_by_code("FRESH1", long_ago()).unwrap().is_some());
    }

    #[test]
    fn test_purge_expired() {
        let db = Database::open_in_memory().unwrap();
        let store = db.rooms();

        let mut expired = room("PLAY01");
        expired.status = RoomStatus::Playing;
        expired.created_at = Utc::now() - Duration::hours(25);
        store.upsert(&expired.snapshot()).unwrap();
        store.upsert(&room("FRESH1").snapshot()).unwrap();

        assert_eq!(store.purge_expired(Utc::now() - Duration::hours(24)).unwrap(), 1);
        assert_eq!(store.count().unwrap(), 1);
    }
}
