use crate::raytracer::error::NetError;
use crate::raytracer::net::{PayloadReader, PayloadWriter};
use crate::raytracer::ray::Ray;

const PARTITION_ID_LEN: usize = 4;

/// Opaque renderer state describing where a ray must resume.
///
/// Only the trailing four bytes have a fixed meaning: the little-endian id of
/// the partition the ray entered next. Everything before that belongs to the
/// renderer that produced it and is replayed byte for byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResumeToken(Vec<u8>);

impl ResumeToken {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        ResumeToken(bytes)
    }

    pub fn with_partition(mut state: Vec<u8>, partition: u32) -> Self {
        state.extend_from_slice(&partition.to_le_bytes());
        ResumeToken(state)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn partition_id(&self) -> Option<u32> {
        let len = self.0.len();
        if len < PARTITION_ID_LEN {
            return None;
        }
        let tail = &self.0[len - PARTITION_ID_LEN..];
        Some(u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]))
    }

    /// Renderer-private bytes, without the partition id.
    pub fn state(&self) -> &[u8] {
        let len = self.0.len().saturating_sub(PARTITION_ID_LEN);
        &self.0[..len]
    }
}

/// A ray travelling between workers: the body of an unresolved-ray message.
#[derive(Clone, Debug, PartialEq)]
pub struct Continuation {
    pub ray: Ray,
    pub x: u32,
    pub y: u32,
    pub token: ResumeToken,
}

impl Continuation {
    pub fn to_payload(&self) -> Vec<u8> {
        self.ray
            .write(PayloadWriter::new())
            .u32(self.x)
            .u32(self.y)
            .bytes(self.token.as_bytes())
            .finish()
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, NetError> {
        let mut r = PayloadReader::new(payload);
        let ray = Ray::read(&mut r)?;
        let x = r.u32()?;
        let y = r.u32()?;
        let token = ResumeToken::from_bytes(r.rest().to_vec());
        Ok(Continuation { ray, x, y, token })
    }
}
