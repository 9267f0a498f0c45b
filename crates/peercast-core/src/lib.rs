//! # peercast-core
//!
//! Room actors, sessions and the room registry for the Peercast relay.
//!
//! This crate provides the moving parts between an accepted connection and
//! the other members of its room:
//!
//! - **Hub** - Registry of live rooms, lazy creation and empty-room sweeps
//! - **Room** - Single-task actor owning a room's membership
//! - **Session** - One connection inside one room, with its listen loop
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  frames  ┌─────────────┐  events  ┌─────────────┐
//! │  Connection │─────────▶│ SessionLoop │─────────▶│  RoomActor  │
//! └─────────────┘          └─────────────┘          └─────────────┘
//!        ▲                        │ ping                   │
//!        └────────────────────────┴────────────────────────┘
//!                          shared FrameWriter
//! ```
//!
//! The [`Hub`] only hands out [`RoomHandle`]s; membership itself is never
//! shared between tasks.

pub mod hub;
pub mod room;
pub mod session;

pub use hub::{Hub, HubConfig, CLEANUP_INTERVAL, DEFAULT_MAILBOX_CAPACITY};
pub use room::{RoomError, RoomHandle};
pub use session::{Account, Session, SessionId, PING_INTERVAL};
