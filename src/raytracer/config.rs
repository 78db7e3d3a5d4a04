use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 41337;
pub const DEFAULT_SECRET: &str = "PRISE_HANDSHAKE";

/// A worker whose queue holds fewer rays than this may receive another cell.
pub const LOW_WATER_MARK: usize = 1000;
pub const ASSIGN_BACKOFF: Duration = Duration::from_millis(1);
pub const DRAIN_POLL: Duration = Duration::from_millis(500);

pub struct SchedulerConfig {
    pub port: u16,
    pub secret: String,
    pub workers: usize,
    pub width: u32,
    pub height: u32,
    pub grain_x: u32,
    pub grain_y: u32,
    pub scene: PathBuf,
    pub output: PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            secret: DEFAULT_SECRET.to_string(),
            workers: 2,
            width: 512,
            height: 512,
            grain_x: 64,
            grain_y: 64,
            scene: PathBuf::from("scene.json"),
            output: PathBuf::from("render.png"),
        }
    }
}

pub struct WorkerConfig {
    pub host: String,
    pub port: u16,
    pub secret: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            secret: DEFAULT_SECRET.to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
