use crate::raytracer::error::NetError;
use glam::Vec3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Handshake = 2,
    Version = 3,
    EverythingOk = 4,
    SceneFile = 19,
    NewCell = 20,
    RenderComplete = 21,
    GetQueueSize = 22,
    QueueSize = 23,
    ModelCount = 24,
    Model = 25,
    WorkerType = 26,
    WorkerResult = 27,
    UnresolvedRay = 28,
}

impl MessageType {
    pub fn from_tag(tag: u8) -> Result<Self, NetError> {
        let ty = match tag {
            2 => MessageType::Handshake,
            3 => MessageType::Version,
            4 => MessageType::EverythingOk,
            19 => MessageType::SceneFile,
            20 => MessageType::NewCell,
            21 => MessageType::RenderComplete,
            22 => MessageType::GetQueueSize,
            23 => MessageType::QueueSize,
            24 => MessageType::ModelCount,
            25 => MessageType::Model,
            26 => MessageType::WorkerType,
            27 => MessageType::WorkerResult,
            28 => MessageType::UnresolvedRay,
            other => return Err(NetError::UnknownTag(other)),
        };
        Ok(ty)
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// Which of a worker's two connections a socket is, sent right after the
/// handshake as a WorkerType message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerRole {
    Control = 1,
    ResultStream = 2,
}

impl WorkerRole {
    pub fn to_payload(self) -> Vec<u8> {
        PayloadWriter::new().i32(self as i32).finish()
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, NetError> {
        match PayloadReader::new(payload).i32()? {
            1 => Ok(WorkerRole::Control),
            2 => Ok(WorkerRole::ResultStream),
            other => Err(NetError::UnknownWorkerType(other)),
        }
    }
}

#[derive(Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i32(mut self, v: i32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn f64(mut self, v: f64) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn vec3(self, v: Vec3) -> Self {
        self.f64(v.x as f64).f64(v.y as f64).f64(v.z as f64)
    }

    pub fn str(mut self, s: &str) -> Self {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
        self
    }

    pub fn bytes(mut self, b: &[u8]) -> Self {
        self.buf.extend_from_slice(b);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], NetError> {
        if self.buf.len() - self.pos < n {
            return Err(NetError::Truncated(what));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u32(&mut self) -> Result<u32, NetError> {
        let b = self.take(4, "u32")?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i32(&mut self) -> Result<i32, NetError> {
        let b = self.take(4, "i32")?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn f64(&mut self) -> Result<f64, NetError> {
        let b = self.take(8, "f64")?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(f64::from_le_bytes(raw))
    }

    pub fn vec3(&mut self) -> Result<Vec3, NetError> {
        let x = self.f64()?;
        let y = self.f64()?;
        let z = self.f64()?;
        Ok(Vec3::new(x as f32, y as f32, z as f32))
    }

    pub fn str(&mut self) -> Result<String, NetError> {
        let rest = &self.buf[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(NetError::Truncated("string"))?;
        let s = std::str::from_utf8(&rest[..end]).map_err(|_| NetError::InvalidString)?;
        self.pos += end + 1;
        Ok(s.to_owned())
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }
}
