//! Room registry - process-wide map from room code to room state
//!
//! The registry is an owned value handed to whoever drives the rooms; it is
//! the single source of truth for live games.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::error::{Error, Result};
use crate::models::{ConnId, Room, RoomSnapshot};

/// Length of generated room codes
pub const ROOM_CODE_LEN: usize = 6;

const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Registry of memory-resident rooms
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a newly created room. Fails if the code is in use.
    pub fn create(&mut self, room: Room) -> Result<&mut Room> {
        if self.rooms.contains_key(&room.code) {
            return Err(Error::RoomExists(room.code));
        }
        tracing::info!(room = %room.code, "Room registered");
        let code = room.code.clone();
        Ok(self.rooms.entry(code).or_insert(room))
    }

    /// Install a room loaded from durable storage.
    ///
    /// Round state is derived fresh; an already resident room wins over the
    /// stored copy.
    pub fn rehydrate(&mut self, snapshot: RoomSnapshot) -> &mut Room {
        let code = snapshot.code.clone();
        self.rooms.entry(code).or_insert_with(|| {
            tracing::info!(room = %snapshot.code, players = snapshot.players.len(), "Room rehydrated");
            Room::from_snapshot(snapshot)
        })
    }

    pub fn get(&self, code: &str) -> Option<&Room> {
        self.rooms.get(code)
    }

    pub fn get_mut(&mut self, code: &str) -> Option<&mut Room> {
        self.rooms.get_mut(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.rooms.contains_key(code)
    }

    /// Remove a room. Deleting an absent room is a no-op.
    pub fn delete(&mut self, code: &str) -> Option<Room> {
        let room = self.rooms.remove(code);
        if room.is_some() {
            tracing::info!(room = %code, "Room removed from registry");
        }
        room
    }

    /// Code of the room in which `conn` holds a seat
    pub fn room_of(&self, conn: ConnId) -> Option<&str> {
        self.rooms
            .values()
            .find(|r| r.player(conn).is_some())
            .map(|r| r.code.as_str())
    }

    /// Codes of idle rooms created before `cutoff`
    pub fn stale(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        self.rooms
            .values()
            .filter(|r| r.is_stale(cutoff))
            .map(|r| r.code.clone())
            .collect()
    }

    /// A random code not used by any resident room
    pub fn generate_code<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        loop {
            let code = random_code(rng);
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.rooms.keys().map(|s| s.as_str())
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

fn random_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}
