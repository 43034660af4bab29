//! Error types for Memecard Core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Room already exists: {0}")]
    RoomExists(String),

    #[error("Already in room {0}")]
    AlreadyInRoom(String),

    #[error("Room is full")]
    RoomFull,

    #[error("Player name already taken in this room: {0}")]
    NameTaken(String),

    #[error("Player not found: {0}")]
    PlayerNotFound(String),

    #[error("Only the host can {0}")]
    NotHost(&'static str),

    #[error("Cannot kick the host")]
    CannotKickHost,

    #[error("Need at least {0} players to start")]
    NotEnoughPlayers(usize),

    #[error("Action not allowed in the current phase")]
    WrongPhase,

    #[error("Card already submitted this round")]
    AlreadySubmitted,

    #[error("Card not in hand: {0}")]
    UnknownCard(String),

    #[error("Already voted this round")]
    AlreadyVoted,

    #[error("Cannot vote for your own submission")]
    SelfVote,

    #[error("Only players who submitted a card can vote")]
    NotEligible,

    #[error("Submission not found")]
    UnknownSubmission,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Precondition failures caused by the acting player rather than by
    /// infrastructure. These are reported back to the actor only.
    pub fn is_precondition(&self) -> bool {
        !matches!(
            self,
            Error::Database(_) | Error::Config(_) | Error::Io(_) | Error::Serialization(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
