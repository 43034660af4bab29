//! Player model and connection handles

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Card;

/// Volatile handle of a live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnId(pub Uuid);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable
        let s = self.0.simple().to_string();
        write!(f, "{}", &s[s.len() - 8..])
    }
}

/// A member of a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    /// Absent while the player is pending or detached
    #[serde(skip)]
    pub conn: Option<ConnId>,
    pub is_host: bool,
    pub score: u32,
    #[serde(default)]
    pub hand: Vec<Card>,
}

impl Player {
    pub fn new(name: impl Into<String>, conn: Option<ConnId>) -> Self {
        Self {
            name: name.into(),
            conn,
            is_host: false,
            score: 0,
            hand: Vec::new(),
        }
    }

    pub fn host(name: impl Into<String>, conn: Option<ConnId>) -> Self {
        Self {
            is_host: true,
            ..Self::new(name, conn)
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.conn.is_none()
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.hand.iter().find(|c| c.id == card_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conn_is_not_persisted() {
        let player = Player::host("alice", Some(ConnId::new()));
        let json = serde_json::to_string(&player).unwrap();
        let back: Player = serde_json::from_str(&json).unwrap();

        assert!(back.is_host);
        assert!(back.is_pending());
    }
}
