//! Client for the Nanonis SPM controller TCP programming interface.
//!
//! Commands are encoded into the controller's binary frame format, sent over
//! a persistent connection and their responses decoded back into typed
//! values. Named shortcuts accept engineering literals like `"100n"`.

pub mod config;
pub mod error;
pub mod nanonis;
pub mod types;
pub mod units;

pub use crate::config::{AppConfig, Limits, load_config, load_config_or_default};
pub use crate::error::NanonisError;
pub use crate::nanonis::{
    Arg, CATALOG, Command, CommandSpec, ConnectionConfig, LimitKind, NanonisClient,
    NanonisClientBuilder, Protocol, Response, SessionState, Transport,
};
pub use crate::types::{NanonisValue, Position, TypeTag, TypedValue};
pub use crate::units::parse_engineering;
