//! Network protocol message types
//!
//! All messages are JSON-serialized and length-prefixed on the wire. Every
//! message is a tagged variant with a fixed schema; anything else fails to
//! decode and never reaches a room.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use memecard_core::{
    Caption, ConnId, Player, Room, RoomStatus, RoundPhase, RoundResults, Submission,
    SubmittedCard, ROOM_CODE_LEN,
};

use crate::error::{Error, Result};

/// Shortest accepted player name, after trimming
pub const MIN_NAME_LEN: usize = 2;
/// Longest accepted player name, after trimming
pub const MAX_NAME_LEN: usize = 20;
/// Longest accepted chat message
pub const MAX_CHAT_LEN: usize = 500;

/// Messages sent by players
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    CreateRoom { player_name: String },
    JoinRoom { room_id: String, player_name: String },
    StartGame { room_id: String },
    StopGame { room_id: String },
    SubmitCard { room_id: String, card_id: String },
    /// Targets a submission by its id (the submitter's connection id)
    VoteCard { room_id: String, target_player_id: ConnId },
    KickPlayer { room_id: String, target_name: String },
    LeaveRoom { room_id: String },
    ChatMessage { room_id: String, text: String },
    /// Create a room with a pending host and no attached connection
    ProvisionRoom { player_name: String },
    /// Add a pending player to a room without attaching the connection
    ProvisionJoin { room_id: String, player_name: String },
    Ping,
}

impl ClientMessage {
    /// Serialize message to JSON bytes
    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Check and normalize player input: names are trimmed, room codes
    /// upper-cased.
    pub fn validate(self) -> Result<Self> {
        use ClientMessage::*;

        let msg = match self {
            CreateRoom { player_name } => CreateRoom {
                player_name: validate_name(&player_name)?,
            },
            JoinRoom {
                room_id,
                player_name,
            } => JoinRoom {
                room_id: validate_room_code(&room_id)?,
                player_name: validate_name(&player_name)?,
            },
            StartGame { room_id } => StartGame {
                room_id: validate_room_code(&room_id)?,
            },
            StopGame { room_id } => StopGame {
                room_id: validate_room_code(&room_id)?,
            },
            SubmitCard { room_id, card_id } => {
                if card_id.trim().is_empty() {
                    return Err(Error::InvalidInput("card id is required".into()));
                }
                SubmitCard {
                    room_id: validate_room_code(&room_id)?,
                    card_id,
                }
            }
            VoteCard {
                room_id,
                target_player_id,
            } => VoteCard {
                room_id: validate_room_code(&room_id)?,
                target_player_id,
            },
            KickPlayer {
                room_id,
                target_name,
            } => KickPlayer {
                room_id: validate_room_code(&room_id)?,
                target_name: validate_name(&target_name)?,
            },
            LeaveRoom { room_id } => LeaveRoom {
                room_id: validate_room_code(&room_id)?,
            },
            ChatMessage { room_id, text } => ChatMessage {
                room_id: validate_room_code(&room_id)?,
                text: validate_chat(&text)?,
            },
            ProvisionRoom { player_name } => ProvisionRoom {
                player_name: validate_name(&player_name)?,
            },
            ProvisionJoin {
                room_id,
                player_name,
            } => ProvisionJoin {
                room_id: validate_room_code(&room_id)?,
                player_name: validate_name(&player_name)?,
            },
            Ping => Ping,
        };
        Ok(msg)
    }

    /// Room the message is addressed to, if any
    pub fn room_id(&self) -> Option<&str> {
        use ClientMessage::*;

        match self {
            JoinRoom { room_id, .. }
            | StartGame { room_id }
            | StopGame { room_id }
            | SubmitCard { room_id, .. }
            | VoteCard { room_id, .. }
            | KickPlayer { room_id, .. }
            | LeaveRoom { room_id }
            | ChatMessage { room_id, .. }
            | ProvisionJoin { room_id, .. } => Some(room_id),
            CreateRoom { .. } | ProvisionRoom { .. } | Ping => None,
        }
    }
}

/// Trimmed name of 2-20 letters, digits and spaces
pub fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    let len = name.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return Err(Error::InvalidInput(format!(
            "Player name must be {MIN_NAME_LEN}-{MAX_NAME_LEN} characters"
        )));
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == ' ') {
        return Err(Error::InvalidInput(
            "Player name may only contain letters, numbers and spaces".into(),
        ));
    }
    Ok(name.to_string())
}

/// Six ASCII alphanumerics, upper-cased
pub fn validate_room_code(code: &str) -> Result<String> {
    let code = code.trim();
    if code.len() != ROOM_CODE_LEN || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::InvalidInput(format!(
            "Room code must be {ROOM_CODE_LEN} letters or numbers"
        )));
    }
    Ok(code.to_ascii_uppercase())
}

pub fn validate_chat(text: &str) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidInput("Message cannot be empty".into()));
    }
    if text.chars().count() > MAX_CHAT_LEN {
        return Err(Error::InvalidInput(format!(
            "Message cannot exceed {MAX_CHAT_LEN} characters"
        )));
    }
    Ok(text.to_string())
}

/// Public view of a player. Hands are only ever sent to their owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub name: String,
    pub is_host: bool,
    pub score: u32,
    pub connected: bool,
}

impl PlayerInfo {
    pub fn from_player(player: &Player) -> Self {
        Self {
            name: player.name.clone(),
            is_host: player.is_host,
            score: player.score,
            connected: player.is_connected(),
        }
    }

    /// Every player of a room, in seat order
    pub fn list(room: &Room) -> Vec<Self> {
        room.players.iter().map(Self::from_player).collect()
    }
}

/// A submission as shown during reveal and voting. The submitter's name
/// stays hidden until results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedSubmission {
    pub id: ConnId,
    pub card: SubmittedCard,
}

impl From<&Submission> for RevealedSubmission {
    fn from(submission: &Submission) -> Self {
        Self {
            id: submission.id,
            card: submission.card.clone(),
        }
    }
}

/// One submission's line in the round results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub id: ConnId,
    pub player_name: String,
    pub card: SubmittedCard,
    pub votes: u32,
    pub is_winner: bool,
}

impl ResultEntry {
    /// Results in reveal order
    pub fn list(room: &Room, results: &RoundResults) -> Vec<Self> {
        room.reveal_order
            .iter()
            .map(|s| Self {
                id: s.id,
                player_name: s.player_name.clone(),
                card: s.card.clone(),
                votes: results.tally.votes_for(s.id),
                is_winner: results.tally.is_winner(&s.player_name),
            })
            .collect()
    }
}

/// Messages sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// First message on every connection
    Connected { conn_id: ConnId },

    RoomCreated {
        room_id: String,
        players: Vec<PlayerInfo>,
    },

    PlayerJoined {
        room_id: String,
        players: Vec<PlayerInfo>,
        new_player: String,
    },

    PlayerLeft {
        player_name: String,
        players: Vec<PlayerInfo>,
    },

    PlayerKicked {
        kicked_player_name: String,
        kicked_by: String,
        players: Vec<PlayerInfo>,
    },

    GameStarted {
        players: Vec<PlayerInfo>,
        status: RoomStatus,
    },

    /// Sent to each player individually with their own hand
    NewRound {
        round: u32,
        caption: Option<Caption>,
        players: Vec<PlayerInfo>,
        time_left: u32,
        phase: RoundPhase,
        cards: Vec<SubmittedCard>,
    },

    /// Current state for a player re-attached mid-game
    PhaseSnapshot {
        room_id: String,
        status: RoomStatus,
        phase: RoundPhase,
        round: u32,
        caption: Option<Caption>,
        time_left: u32,
        players: Vec<PlayerInfo>,
        cards: Vec<SubmittedCard>,
        /// Submissions revealed so far, in reveal order
        revealed: Vec<RevealedSubmission>,
        has_submitted: bool,
        has_voted: bool,
    },

    Countdown {
        time_left: u32,
        phase: RoundPhase,
    },

    CardSubmitted {
        player_name: String,
        submissions_count: usize,
        total_players: usize,
    },

    RevealSubmission {
        caption: Option<Caption>,
        submission: RevealedSubmission,
        current_index: usize,
        total_submissions: usize,
    },

    VotingPhase {
        caption: Option<Caption>,
        submissions: Vec<RevealedSubmission>,
        time_left: u32,
    },

    VoteReceived {
        voter_name: String,
        votes_count: usize,
        total_voters: usize,
    },

    RoundResults {
        round: u32,
        results: Vec<ResultEntry>,
        winners: Vec<String>,
        max_votes: u32,
        players: Vec<PlayerInfo>,
    },

    GameOver {
        winner: String,
        final_score: u32,
        players: Vec<PlayerInfo>,
    },

    GameStopped { players: Vec<PlayerInfo> },

    HostLeft { host_name: String, message: String },

    /// The connection was removed from its room
    KickedToLobby { reason: String, message: String },

    RoomDeleted { room_id: String, reason: String },

    Chat {
        sender: String,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// Reply to an out-of-band provisioning request
    Provisioned {
        room_id: String,
        players: Vec<PlayerInfo>,
    },

    Error { message: String },

    Pong,
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Serialize message to JSON bytes
    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
