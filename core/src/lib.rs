//! Seabird Core
//!
//! This crate provides the protocol engine for a modular IRC bot: the line
//! codec, the ISUPPORT and channel mode grammars, the registration handshake,
//! live user and channel tracking, and the module dispatcher.

pub mod bot;
pub mod buffer;
pub mod client;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod isupport;
pub mod message;
pub mod modes;
pub mod module;
pub mod numeric;
pub mod session;
pub mod tls;
pub mod tracker;
pub mod user;

pub use bot::Bot;
pub use buffer::{RecvQueue, SendQueue};
pub use client::Client;
pub use config::Config;
pub use connection::{Connection, ConnectionStream};
pub use context::Context;
pub use error::{Error, Result};
pub use isupport::{ISupport, ISupportValue, PrefixTable};
pub use message::{serialize, Identity, Message};
pub use modes::{parse_mode_changes, ChannelModes, ModeChange, ModeKind};
pub use module::{CommandInfo, Module, ModuleManager, Registrar};
pub use session::{Session, SessionState};
pub use tracker::Tracker;
pub use user::User;

/// Re-exports for convenience
pub use tracing::{debug, error, info, warn};
