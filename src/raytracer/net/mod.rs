mod connection;
mod message;

pub use connection::Connection;
pub use message::{MessageType, PayloadReader, PayloadWriter, WorkerRole};

#[cfg(test)]
pub(crate) use connection::tests::{connection_pair, socket_pair};
