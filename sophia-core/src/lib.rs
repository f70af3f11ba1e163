//! # SOPHIA Core Library
//!
//! The authoritative rules engine behind a philosophical role-playing game.
//! The browser client renders scenes and relays intents; everything that
//! decides an outcome lives here:
//!
//! - **Player Registry**: authoritative [`PlayerState`] records, stored in
//!   memory or SQLite, mutated only inside per-player transactions.
//! - **Authenticity Ledger**: an append-only log of moral-choice impacts
//!   feeding a bounded metric and add-only permanent markers.
//! - **Scenario Engine**: narrative choice sets and their effects, including
//!   the slow drift of a player's philosophical alignment.
//! - **Combat Engine**: syllogism encounters. Judge an argument's validity,
//!   strike with an equipped fallacy or take the hit.
//!
//! ```text
//! caller ──► ScenarioEngine / CombatEngine ──► AuthenticityLedger
//!                       │                              │
//!                       └────────► PlayerRegistry ◄────┘
//!                                  (transaction + store)
//! ```
//!
//! [`GameEngine`] wires the four together and dispatches tagged [`Action`]s.

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod alignment;
pub mod combat;
pub mod config;
pub mod content;
pub mod error;
pub mod game;
pub mod ledger;
pub mod persistence;
pub mod player;
pub mod registry;
pub mod scenario;
pub mod types;

pub use config::SophiaConfig;
pub use content::ContentLibrary;
pub use error::SophiaError;
pub use game::{Action, ActionResponse, GameEngine};
pub use player::PlayerState;
pub use types::*;
