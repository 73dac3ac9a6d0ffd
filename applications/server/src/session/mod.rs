/// Session/connection management
pub mod connection;
pub mod pool;

pub use connection::Connection;
pub use pool::{ConnectionId, ConnectionKind, ConnectionPool, Registration, Session};
