use crate::raytracer::net::MessageType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed")]
    Closed,

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("unknown message tag {0}")]
    UnknownTag(u8),

    #[error("expected {expected:?}, received {received:?}")]
    Unexpected {
        expected: MessageType,
        received: MessageType,
    },

    #[error("peer sent the wrong handshake secret")]
    BadSecret,

    #[error("payload truncated reading {0}")]
    Truncated(&'static str),

    #[error("malformed {0}")]
    Malformed(&'static str),

    #[error("string field is not valid UTF-8")]
    InvalidString,

    #[error("unknown worker type {0}")]
    UnknownWorkerType(i32),
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("scene description error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("unknown material '{0}'")]
    UnknownMaterial(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no scene has been set")]
    NoScene,

    #[error("job already engaged")]
    AlreadyEngaged,

    #[error("no workers expected")]
    NoWorkers,

    #[error("registration incomplete: {registered} workers, {connected} result streams, {expected} expected")]
    NotReady {
        registered: usize,
        connected: usize,
        expected: usize,
    },

    #[error("worker {worker}: {source}")]
    Worker {
        worker: usize,
        #[source]
        source: NetError,
    },

    #[error("partition {0:?} has no owning worker")]
    Routing(Option<u32>),

    #[error("malformed unresolved ray: {0}")]
    BadRay(#[source] NetError),

    #[error("failed to write image: {0}")]
    Output(#[from] image::ImageError),
}

/// Top-level failure of a scheduler or worker process.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("render thread panicked")]
    RenderThread,
}
