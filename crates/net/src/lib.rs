//! Memecard network layer
//!
//! Hosts the room session engine behind a TCP server.
//!
//! # Architecture
//!
//! - **Engine**: single task owning every room; events in, messages out
//! - **Server**: accepts connections and feeds the engine
//! - **Sync**: write-behind persistence on a dedicated storage thread
//! - **Protocol**: length-prefixed JSON messages
//!
//! # Usage
//!
//! ```ignore
//! let (sync, storage_thread) = SyncHandle::spawn(db, config.retention())?;
//! let (engine, handle, inbox) = Engine::new(config, Box::new(deck), sync);
//! let engine_task = tokio::spawn(engine.run(inbox));
//! let server = Server::start(addr, handle.clone()).await?;
//! ```

pub mod client;
pub mod engine;
pub mod error;
mod frame;
pub mod protocol;
pub mod server;
pub mod sync;
pub mod timers;

pub use client::{Client, ServerEvent};
pub use engine::{Engine, EngineHandle, Event};
pub use error::{Error, Result};
pub use protocol::{ClientMessage, PlayerInfo, ServerMessage};
pub use server::Server;
pub use sync::SyncHandle;

/// Default port for the session server
pub const DEFAULT_PORT: u16 = 3001;
