//! # Ghostwire core
//!
//! Bridges the line-oriented output of a game server with a chat platform.
//! Selected events (player presence, chat, server lifecycle) are
//! re-published to the chat, while privileged users can change what is
//! published about their own game account.
//!
//! ## Architecture
//!
//! * **Identity linker** ([`identity`]) - links a chat account to a game
//!   account through a one-time code whispered in-game
//! * **Log classifier** ([`classifier`]) - turns one raw line into a typed
//!   event; pure and stateless
//! * **Presence tracker** ([`presence`]) - the raw table of online accounts
//!   and the hidden set; the visible list is derived on read
//! * **Spy mode** ([`spy`]) - per account log categories to drop
//! * **Ghost mode** ([`ghost`], [`visibility`]) - full invisibility with
//!   synthesized leave/join notices
//! * **Forwarder** ([`forwarder`]) - delivers surviving events to the chat
//!   and batches the console mirror
//!
//! ## Message flow
//!
//! 1. The game process writes a line; [`pipeline::LogPipeline`] classifies it
//! 2. JOIN/LEAVE lines update presence and may trigger ghost transitions
//! 3. Spy and ghost suppression decide what survives
//! 4. Surviving events are queued as [`forwarder::Outbound`] in arrival order
//! 5. The forwarder task sends them to the chat client
//!
//! Chat commands ([`commands`]) mutate identity, spy and ghost state, which
//! feeds back into step 3.
//!
//! ## Thread safety
//!
//! Every service owns its locks. Ghost transitions and JOIN/LEAVE handling
//! share one transition lock so their effects never interleave. No lock is
//! held across chat or game I/O.

pub use bridge::{Bridge, Collaborators};
pub use config::CoreConfig;
pub use error::{BridgeError, BridgeResult};
pub use external::{ChatClient, GameProcess};
pub use shutdown::ShutdownState;

pub mod bridge;
pub mod classifier;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod external;
pub mod forwarder;
pub mod game_command;
pub mod ghost;
pub mod identity;
pub mod pipeline;
pub mod presence;
pub mod shutdown;
pub mod spy;
pub mod store;
pub mod utils;
pub mod visibility;

#[cfg(test)]
pub(crate) mod testing;
