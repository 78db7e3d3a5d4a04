pub mod client;
pub mod render_loop;
pub mod scheduler_connection;
pub mod work_queue;

pub use client::run;
