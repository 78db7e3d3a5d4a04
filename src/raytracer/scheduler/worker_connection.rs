use crate::raytracer::error::{EngineError, NetError};
use crate::raytracer::net::{Connection, MessageType, PayloadReader, PayloadWriter};
use crate::raytracer::renderer::SpatialIndex;
use crate::raytracer::scene::{ModelDescriptor, SceneAssignment};
use crate::raytracer::scheduler::cells::Cell;
use crate::raytracer::scheduler::engine::{SchedulerEngine, WorkerLink};
use glam::Vec4;
use log::{debug, error, info, warn};
use parking_lot::Mutex;

/// Scheduler-side proxy for one worker's control connection.
///
/// The balancer thread and every result-reader thread share it, so each
/// request/response pair runs under one lock hold.
pub struct WorkerConnection {
    connection: Mutex<Connection>,
}

impl WorkerConnection {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection: Mutex::new(connection),
        }
    }

    fn send(&self, ty: MessageType, payload: &[u8]) -> Result<(), NetError> {
        self.connection.lock().send_message(ty, payload)
    }
}

impl WorkerLink for WorkerConnection {
    fn send_scene(&self, assignment: &SceneAssignment) -> Result<(), NetError> {
        self.send(MessageType::SceneFile, &assignment.to_payload())
    }

    fn send_models(&self, models: &[ModelDescriptor]) -> Result<(), NetError> {
        let mut connection = self.connection.lock();
        connection.send_message(
            MessageType::ModelCount,
            &PayloadWriter::new().u32(models.len() as u32).finish(),
        )?;
        for model in models {
            connection.send_message(MessageType::Model, &model.to_payload())?;
        }
        Ok(())
    }

    fn send_cell(&self, cell: &Cell) -> Result<(), NetError> {
        self.send(MessageType::NewCell, &cell.to_payload())
    }

    fn forward_ray(&self, payload: &[u8]) -> Result<(), NetError> {
        self.send(MessageType::UnresolvedRay, payload)
    }

    fn queue_size(&self) -> Result<usize, NetError> {
        let mut connection = self.connection.lock();
        connection.send_message(MessageType::GetQueueSize, &[])?;
        let payload = connection.receive_specific(MessageType::QueueSize)?;
        Ok(PayloadReader::new(&payload).u32()? as usize)
    }

    fn send_complete(&self) -> Result<(), NetError> {
        self.send(MessageType::RenderComplete, &[])
    }

    fn await_complete(&self) -> Result<(), NetError> {
        self.connection
            .lock()
            .receive_specific(MessageType::RenderComplete)?;
        Ok(())
    }
}

/// Parses a WorkerResult payload: pixel coordinates then RGBA.
pub fn decode_result(payload: &[u8]) -> Result<(u32, u32, Vec4), NetError> {
    let mut r = PayloadReader::new(payload);
    let x = r.u32()?;
    let y = r.u32()?;
    let color = Vec4::new(
        r.f64()? as f32,
        r.f64()? as f32,
        r.f64()? as f32,
        r.f64()? as f32,
    );
    Ok((x, y, color))
}

/// Reads a worker's result stream until the worker signals completion.
pub fn process_worker_request<W, S>(
    engine: &SchedulerEngine<W, S>,
    mut connection: Connection,
) -> Result<(), NetError>
where
    W: WorkerLink,
    S: SpatialIndex,
{
    let mut results = 0usize;
    let mut handoffs = 0usize;
    loop {
        let message = connection.receive_message()?;
        match message.ty {
            MessageType::WorkerResult => {
                let (x, y, color) = decode_result(&message.payload)?;
                engine.worker_result(x, y, color);
                results += 1;
            }
            MessageType::UnresolvedRay => {
                handoffs += 1;
                match engine.unresolved_ray(&message.payload) {
                    Ok(_) => {}
                    Err(e @ EngineError::Worker { .. }) => error!("{}: {}", connection.peer(), e),
                    // Routing failures are already recorded against the job.
                    Err(e) => debug!("{}: {}", connection.peer(), e),
                }
            }
            MessageType::RenderComplete => {
                info!(
                    "{} finished: {} results, {} handoffs",
                    connection.peer(),
                    results,
                    handoffs
                );
                return Ok(());
            }
            other => warn!("{} sent unexpected {:?} on its result stream", connection.peer(), other),
        }
    }
}
