//! Memecard Core Library
//!
//! Room models, the round state machine, membership rules and storage
//! for the meme-card party game.

pub mod cards;
pub mod config;
pub mod error;
pub mod invariants;
pub mod membership;
pub mod models;
pub mod registry;
pub mod round;
pub mod storage;
pub mod tally;

pub use cards::{CardSource, Deck};
pub use config::GameConfig;
pub use error::{Error, Result};
pub use membership::JoinOutcome;
pub use models::*;
pub use registry::{RoomRegistry, ROOM_CODE_LEN};
pub use round::{DealSummary, RoundResults};
pub use storage::{
    Database, LibraryFile, LibraryRepository, LibraryStore, RoomRepository, RoomStore, Storage,
};
pub use tally::{tally, SubmissionCount, Tally};
