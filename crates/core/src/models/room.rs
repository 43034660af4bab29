//! Room model - one isolated game instance

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Caption, ConnId, Player, SubmittedCard};

/// Lifecycle of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    #[default]
    Waiting,
    Playing,
    Finished,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::Playing => "playing",
            RoomStatus::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(RoomStatus::Waiting),
            "playing" => Some(RoomStatus::Playing),
            "finished" => Some(RoomStatus::Finished),
            _ => None,
        }
    }

    /// Rooms in these states can be reaped once stale
    pub fn is_idle(&self) -> bool {
        matches!(self, RoomStatus::Waiting | RoomStatus::Finished)
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage within an active round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    #[default]
    None,
    Submitting,
    Revealing,
    Voting,
    Results,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoundPhase::None => "none",
            RoundPhase::Submitting => "submitting",
            RoundPhase::Revealing => "revealing",
            RoundPhase::Voting => "voting",
            RoundPhase::Results => "results",
        };
        f.write_str(s)
    }
}

/// A card played this round. Identified by the submitter's connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: ConnId,
    pub player_name: String,
    pub card: SubmittedCard,
}

/// A vote cast this round. Identified by the voter's connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub voter: ConnId,
    pub voter_name: String,
    pub target: ConnId,
    pub target_name: String,
}

/// Authoritative in-memory state of a room
#[derive(Debug, Clone)]
pub struct Room {
    pub code: String,
    /// Insertion order is turn order
    pub players: Vec<Player>,
    pub status: RoomStatus,
    pub phase: RoundPhase,
    pub caption: Option<Caption>,
    pub submissions: Vec<Submission>,
    pub votes: Vec<Vote>,
    /// Submissions in display order, fixed when reveal begins
    pub reveal_order: Vec<Submission>,
    /// How many of `reveal_order` have been shown
    pub revealed: usize,
    /// Seconds left in the current timed phase
    pub countdown: u32,
    /// Increments on every deal; tags timer events
    pub round: u32,
    pub max_players: usize,
    pub win_score: u32,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(code: impl Into<String>, host: Player, max_players: usize, win_score: u32) -> Self {
        Self {
            code: code.into(),
            players: vec![host],
            status: RoomStatus::Waiting,
            phase: RoundPhase::None,
            caption: None,
            submissions: Vec::new(),
            votes: Vec::new(),
            reveal_order: Vec::new(),
            revealed: 0,
            countdown: 0,
            round: 0,
            max_players,
            win_score,
            created_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    pub fn host(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_host)
    }

    pub fn player(&self, conn: ConnId) -> Option<&Player> {
        self.players.iter().find(|p| p.conn == Some(conn))
    }

    pub fn player_mut(&mut self, conn: ConnId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.conn == Some(conn))
    }

    pub fn player_by_name(&self, name: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.name == name)
    }

    pub fn is_host(&self, conn: ConnId) -> bool {
        self.player(conn).is_some_and(|p| p.is_host)
    }

    /// Live connections of every member, in player order
    pub fn connections(&self) -> impl Iterator<Item = ConnId> + '_ {
        self.players.iter().filter_map(|p| p.conn)
    }

    pub fn submission_of(&self, conn: ConnId) -> Option<&Submission> {
        self.submissions.iter().find(|s| s.id == conn)
    }

    pub fn vote_of(&self, conn: ConnId) -> Option<&Vote> {
        self.votes.iter().find(|v| v.voter == conn)
    }

    /// Stale rooms are reaped only while not mid-game
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.created_at < cutoff && self.status.is_idle()
    }

    /// Durable view of the room: membership, scores and status only
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code.clone(),
            players: self.players.clone(),
            status: self.status,
            max_players: self.max_players,
            win_score: self.win_score,
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }

    /// Rebuild a room from its durable snapshot.
    ///
    /// Round state is never persisted, so a room stored mid-game comes back
    /// waiting with scores intact. Every player starts pending.
    pub fn from_snapshot(snapshot: RoomSnapshot) -> Self {
        let mut players: Vec<Player> = Vec::with_capacity(snapshot.players.len());
        for mut player in snapshot.players {
            let name = player.name.trim();
            if name.is_empty() || players.iter().any(|p| p.name == name) {
                tracing::warn!(room = %snapshot.code, player = %player.name, "Dropping duplicate or blank stored player");
                continue;
            }
            player.name = name.to_string();
            player.conn = None;
            players.push(player);
        }

        let status = match snapshot.status {
            RoomStatus::Playing => RoomStatus::Waiting,
            other => other,
        };

        Self {
            code: snapshot.code,
            players,
            status,
            phase: RoundPhase::None,
            caption: None,
            submissions: Vec::new(),
            votes: Vec::new(),
            reveal_order: Vec::new(),
            revealed: 0,
            countdown: 0,
            round: 0,
            max_players: snapshot.max_players,
            win_score: snapshot.win_score,
            created_at: snapshot.created_at,
        }
    }
}

/// What the durable store keeps for a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub code: String,
    pub players: Vec<Player>,
    pub status: RoomStatus,
    pub max_players: usize,
    pub win_score: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
