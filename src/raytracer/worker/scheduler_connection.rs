use crate::raytracer::camera::Camera;
use crate::raytracer::error::NetError;
use crate::raytracer::net::{Connection, MessageType, PayloadReader, PayloadWriter, WorkerRole};
use crate::raytracer::renderer::Continuation;
use crate::raytracer::scene::{ModelDescriptor, SceneAssignment};
use crate::raytracer::scheduler::cells::Cell;
use crate::raytracer::worker::work_queue::WorkQueue;
use glam::Vec4;
use log::{debug, trace, warn};
use std::net::ToSocketAddrs;

/// Connects, handshakes and announces which of the two worker connections
/// this is.
pub fn open<A: ToSocketAddrs>(addr: A, secret: &str, role: WorkerRole) -> Result<Connection, NetError> {
    let mut connection = Connection::connect(addr)?;
    connection.handshake(secret)?;
    connection.send_message(MessageType::WorkerType, &role.to_payload())?;
    debug!("{:?} connection to {} ready", role, connection.peer());
    Ok(connection)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControlStats {
    pub cells: usize,
    pub continuations: usize,
    pub polls: usize,
}

/// Worker-side proxy for the scheduler's control channel.
pub struct SchedulerConnection {
    connection: Connection,
}

impl SchedulerConnection {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Scene assignment followed by the model list.
    pub fn receive_assignment(&mut self) -> Result<(SceneAssignment, Vec<ModelDescriptor>), NetError> {
        let payload = self.connection.receive_specific(MessageType::SceneFile)?;
        let assignment = SceneAssignment::from_payload(&payload)?;

        let payload = self.connection.receive_specific(MessageType::ModelCount)?;
        let count = PayloadReader::new(&payload).u32()? as usize;
        let mut models = Vec::with_capacity(count);
        for _ in 0..count {
            let payload = self.connection.receive_specific(MessageType::Model)?;
            models.push(ModelDescriptor::from_payload(&payload)?);
        }
        Ok((assignment, models))
    }

    /// Handles control traffic until the scheduler declares the render
    /// complete, then marks the queue finished.
    pub fn serve(
        &mut self,
        queue: &WorkQueue,
        camera: &Camera,
        width: u32,
        height: u32,
    ) -> Result<ControlStats, NetError> {
        let mut stats = ControlStats::default();
        loop {
            let message = self.connection.receive_message()?;
            match message.ty {
                MessageType::NewCell => {
                    let cell = Cell::from_payload(&message.payload)?;
                    trace!("Cell {:?}", cell);
                    for (x, y) in cell.pixels() {
                        queue.push_origin(camera.pixel_ray(x, y, width, height), x, y);
                    }
                    stats.cells += 1;
                }
                MessageType::UnresolvedRay => {
                    queue.push_continuation(Continuation::from_payload(&message.payload)?);
                    stats.continuations += 1;
                }
                MessageType::GetQueueSize => {
                    let size = queue.size().min(u32::MAX as usize) as u32;
                    self.connection
                        .send_message(MessageType::QueueSize, &PayloadWriter::new().u32(size).finish())?;
                    stats.polls += 1;
                }
                MessageType::RenderComplete => {
                    queue.finish();
                    return Ok(stats);
                }
                other => warn!("Ignoring unexpected {:?} from scheduler", other),
            }
        }
    }

    /// Acknowledges completion once the local queue has drained.
    pub fn send_complete(&mut self) -> Result<(), NetError> {
        self.connection.send_message(MessageType::RenderComplete, &[])
    }
}

/// Worker-side writer for the result stream.
pub struct ResultStream {
    connection: Connection,
}

impl ResultStream {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn send_result(&mut self, x: u32, y: u32, color: Vec4) -> Result<(), NetError> {
        let payload = PayloadWriter::new()
            .u32(x)
            .u32(y)
            .f64(color.x as f64)
            .f64(color.y as f64)
            .f64(color.z as f64)
            .f64(color.w as f64)
            .finish();
        self.connection.send_message(MessageType::WorkerResult, &payload)
    }

    pub fn send_unresolved(&mut self, continuation: &Continuation) -> Result<(), NetError> {
        self.connection
            .send_message(MessageType::UnresolvedRay, &continuation.to_payload())
    }

    pub fn send_complete(&mut self) -> Result<(), NetError> {
        self.connection.send_message(MessageType::RenderComplete, &[])
    }
}
