pub mod camera;
pub mod config;
pub mod error;
pub mod exporter;
pub mod framebuffer;
pub mod loader;
pub mod net;
pub mod partition;
pub mod ray;
pub mod renderer;
pub mod scene;
pub mod scheduler;
pub mod shape;
pub mod worker;
