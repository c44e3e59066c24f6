//! Character persona chat gateway.
//!
//! Fronts a remote language model with a fixed table of character personas,
//! keeps conversations and custom characters in an injectable record store,
//! and runs heuristic persona tests whose verdicts are stored for review.

pub mod config;
pub mod conversation;
pub mod error;
pub mod evaluation;
pub mod gateway;
pub mod observability;
pub mod persona;
pub mod providers;
pub mod service;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use service::ChatService;
