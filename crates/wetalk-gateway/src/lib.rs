pub mod connection;
pub mod relay;

pub use relay::{ConnId, Relay, RelayError};
