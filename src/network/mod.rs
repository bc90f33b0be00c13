//! Listeners and per-connection drivers.

mod connection;
mod gateway;
mod stream;

pub use connection::Connection;
pub use gateway::Gateway;
pub use stream::ClientStream;
