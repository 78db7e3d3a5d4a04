use super::message::{MessageType, PayloadReader, PayloadWriter};
use crate::raytracer::error::NetError;
use log::{trace, warn};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};

pub const PROTOCOL_VERSION: [u32; 4] = [1, 3, 0, 0];
pub const MAX_PAYLOAD: usize = 64 << 20;

const HEADER_LEN: usize = 5;

#[derive(Debug)]
pub struct Message {
    pub ty: MessageType,
    pub payload: Vec<u8>,
}

/// Framed message transport over one TCP stream.
///
/// Every frame is a one byte tag, a little-endian `u32` payload length and
/// the payload. A stream that ends inside a frame is reported as
/// [`NetError::Closed`] and the connection should be dropped.
pub struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    peer: String,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Result<Self, NetError> {
        stream.set_nodelay(true)?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            reader,
            writer: BufWriter::new(stream),
            peer,
        })
    }

    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, NetError> {
        Self::new(TcpStream::connect(addr)?)
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn send_message(&mut self, ty: MessageType, payload: &[u8]) -> Result<(), NetError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(NetError::FrameTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        let mut header = [0u8; HEADER_LEN];
        header[0] = ty.tag();
        header[1..].copy_from_slice(&(payload.len() as u32).to_le_bytes());

        self.writer.write_all(&header).map_err(map_io)?;
        self.writer.write_all(payload).map_err(map_io)?;
        self.writer.flush().map_err(map_io)?;
        trace!("{} <- {:?} ({} bytes)", self.peer, ty, payload.len());
        Ok(())
    }

    pub fn receive_message(&mut self) -> Result<Message, NetError> {
        let mut header = [0u8; HEADER_LEN];
        self.reader.read_exact(&mut header).map_err(map_io)?;

        let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
        if len > MAX_PAYLOAD {
            return Err(NetError::FrameTooLarge {
                len,
                max: MAX_PAYLOAD,
            });
        }

        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload).map_err(map_io)?;

        // Payload is consumed before the tag is checked so the stream stays framed.
        let ty = MessageType::from_tag(header[0])?;
        trace!("{} -> {:?} ({} bytes)", self.peer, ty, len);
        Ok(Message { ty, payload })
    }

    pub fn receive_specific(&mut self, expected: MessageType) -> Result<Vec<u8>, NetError> {
        let msg = self.receive_message()?;
        if msg.ty != expected {
            return Err(NetError::Unexpected {
                expected,
                received: msg.ty,
            });
        }
        Ok(msg.payload)
    }

    /// Client half of the handshake: secret, version, then wait for the OK.
    pub fn handshake(&mut self, secret: &str) -> Result<(), NetError> {
        self.send_message(MessageType::Handshake, &PayloadWriter::new().str(secret).finish())?;

        let [major, minor, revision, build] = PROTOCOL_VERSION;
        let version = PayloadWriter::new()
            .u32(major)
            .u32(minor)
            .u32(revision)
            .u32(build)
            .finish();
        self.send_message(MessageType::Version, &version)?;

        self.receive_specific(MessageType::EverythingOk)?;
        Ok(())
    }

    /// Server half of the handshake.
    ///
    /// A wrong secret fails the connection. A version mismatch is only logged.
    pub fn accept_handshake(&mut self, secret: &str) -> Result<[u32; 4], NetError> {
        let payload = self.receive_specific(MessageType::Handshake)?;
        if PayloadReader::new(&payload).str()? != secret {
            return Err(NetError::BadSecret);
        }

        let payload = self.receive_specific(MessageType::Version)?;
        let mut r = PayloadReader::new(&payload);
        let version = [r.u32()?, r.u32()?, r.u32()?, r.u32()?];
        if version != PROTOCOL_VERSION {
            warn!(
                "{} speaks version {}.{}.{} build {}, we are {}.{}.{} build {}",
                self.peer,
                version[0],
                version[1],
                version[2],
                version[3],
                PROTOCOL_VERSION[0],
                PROTOCOL_VERSION[1],
                PROTOCOL_VERSION[2],
                PROTOCOL_VERSION[3]
            );
        }

        self.send_message(MessageType::EverythingOk, &[])?;
        Ok(version)
    }

    pub fn shutdown(&self) {
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }
}

fn map_io(e: std::io::Error) -> NetError {
    match e.kind() {
        ErrorKind::UnexpectedEof
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe => NetError::Closed,
        _ => NetError::Io(e),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    pub(crate) fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    pub(crate) fn connection_pair() -> (Connection, Connection) {
        let (a, b) = socket_pair();
        (Connection::new(a).unwrap(), Connection::new(b).unwrap())
    }

    #[test]
    fn test_message_arrives_intact() {
        let (mut a, mut b) = connection_pair();
        a.send_message(MessageType::NewCell, &[1, 2, 3, 4]).unwrap();
        a.send_message(MessageType::GetQueueSize, &[]).unwrap();

        let msg = b.receive_message().unwrap();
        assert_eq!(msg.ty, MessageType::NewCell);
        assert_eq!(msg.payload, vec![1, 2, 3, 4]);
        assert!(b.receive_specific(MessageType::GetQueueSize).unwrap().is_empty());
    }

    #[test]
    fn test_receive_specific_rejects_other_types() {
        let (mut a, mut b) = connection_pair();
        a.send_message(MessageType::QueueSize, &0u32.to_le_bytes()).unwrap();

        match b.receive_specific(MessageType::RenderComplete) {
            Err(NetError::Unexpected { expected, received }) => {
                assert_eq!(expected, MessageType::RenderComplete);
                assert_eq!(received, MessageType::QueueSize);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_handshake_succeeds_with_matching_secret() {
        let (mut client, mut server) = connection_pair();
        let handle = thread::spawn(move || server.accept_handshake("secret"));
        client.handshake("secret").unwrap();
        assert_eq!(handle.join().unwrap().unwrap(), PROTOCOL_VERSION);
    }

    #[test]
    fn test_handshake_fails_with_wrong_secret() {
        let (mut client, mut server) = connection_pair();
        let handle = thread::spawn(move || {
            let result = server.accept_handshake("secret");
            server.shutdown();
            result
        });
        assert!(client.handshake("guess").is_err());
        assert!(matches!(handle.join().unwrap(), Err(NetError::BadSecret)));
    }

    #[test]
    fn test_version_mismatch_is_not_fatal() {
        let (raw, server) = socket_pair();
        let mut server = Connection::new(server).unwrap();
        let mut client = Connection::new(raw).unwrap();

        client
            .send_message(MessageType::Handshake, &PayloadWriter::new().str("s").finish())
            .unwrap();
        let old = PayloadWriter::new().u32(0).u32(9).u32(0).u32(1).finish();
        client.send_message(MessageType::Version, &old).unwrap();

        assert_eq!(server.accept_handshake("s").unwrap(), [0, 9, 0, 1]);
        assert!(client.receive_specific(MessageType::EverythingOk).is_ok());
    }

    #[test]
    fn test_truncated_frame_is_a_closed_connection() {
        let (mut raw, server) = socket_pair();
        let mut server = Connection::new(server).unwrap();
        raw.write_all(&[MessageType::NewCell.tag(), 16, 0, 0, 0, 1, 2]).unwrap();
        drop(raw);

        assert!(matches!(server.receive_message(), Err(NetError::Closed)));
    }

    #[test]
    fn test_oversized_length_prefix_is_rejected() {
        let (mut raw, server) = socket_pair();
        let mut server = Connection::new(server).unwrap();
        raw.write_all(&[MessageType::Model.tag(), 0xff, 0xff, 0xff, 0xff]).unwrap();

        assert!(matches!(
            server.receive_message(),
            Err(NetError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_unknown_tag_keeps_stream_framed() {
        let (mut raw, server) = socket_pair();
        let mut server = Connection::new(server).unwrap();
        raw.write_all(&[99, 2, 0, 0, 0, 7, 7]).unwrap();
        raw.write_all(&[MessageType::GetQueueSize.tag(), 0, 0, 0, 0]).unwrap();

        assert!(matches!(server.receive_message(), Err(NetError::UnknownTag(99))));
        assert_eq!(server.receive_message().unwrap().ty, MessageType::GetQueueSize);
    }
}
