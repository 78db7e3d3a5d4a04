pub mod cells;
pub mod engine;
pub mod server;
pub mod worker_connection;

pub use server::run;
