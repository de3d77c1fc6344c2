pub mod client;
pub mod codec;
pub mod protocol;
pub mod transport;

// Re-export the main types from client
pub use client::{
    Arg, ArgSpec, CATALOG, CommandSpec, ConnectionConfig, DEFAULT_PORT, LimitKind, NanonisClient,
    NanonisClientBuilder, SessionState,
};
pub use protocol::{Command, MessageHeader, Protocol, Response, ServerFault};
pub use transport::Transport;
