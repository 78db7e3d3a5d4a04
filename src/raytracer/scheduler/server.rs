use crate::raytracer::config::SchedulerConfig;
use crate::raytracer::error::{NetError, RunError};
use crate::raytracer::exporter::{Exporter, PngExporter};
use crate::raytracer::net::{Connection, MessageType, WorkerRole};
use crate::raytracer::partition::PartitionGrid;
use crate::raytracer::renderer::SpatialIndex;
use crate::raytracer::scene::{Scene, SceneDescription};
use crate::raytracer::scheduler::engine::{Job, SchedulerEngine};
use crate::raytracer::scheduler::worker_connection::{process_worker_request, WorkerConnection};
use log::{error, info, warn};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Engine<S> = SchedulerEngine<WorkerConnection, S>;

/// Loads the scene, waits for the configured workers and renders one frame.
pub fn run(config: &SchedulerConfig) -> Result<(), RunError> {
    let description = SceneDescription::from_file(&config.scene)?;
    let scene = Scene::load(&config.scene, &description.models, config.width, config.height)?;
    let grid = PartitionGrid::build(&scene.triangles, scene.grid, config.workers);
    info!(
        "{} triangles in {} regions for {} workers",
        scene.triangles.len(),
        grid.region_count(),
        config.workers
    );

    let engine = Arc::new(SchedulerEngine::new(grid));
    engine.set_scene(Job {
        scene: config.scene.clone(),
        output: config.output.clone(),
        width: config.width,
        height: config.height,
        grain_x: config.grain_x,
        grain_y: config.grain_y,
        background: scene.background,
    })?;
    for model in description.models {
        engine.add_model_to_scene(model)?;
    }
    engine.wait_for_workers(config.workers);

    let listener = TcpListener::bind(("0.0.0.0", config.port))?;
    info!("Listening on {}", listener.local_addr()?);
    serve(&engine, &listener, &config.secret, &PngExporter::default())
}

/// Accepts registrations until the barrier is met, then runs the job.
pub fn serve<S>(
    engine: &Arc<SchedulerEngine<WorkerConnection, S>>,
    listener: &TcpListener,
    secret: &str,
    sink: &dyn Exporter,
) -> Result<(), RunError>
where
    S: SpatialIndex + Send + Sync + 'static,
{
    let readers = accept_workers(engine, listener, secret)?;
    info!("All {} workers connected", engine.expected_workers());

    engine.engage(sink)?;

    for reader in readers {
        if reader.join().is_err() {
            error!("Result reader panicked");
        }
    }
    Ok(())
}

fn accept_workers<S>(
    engine: &Arc<Engine<S>>,
    listener: &TcpListener,
    secret: &str,
) -> Result<Vec<JoinHandle<()>>, RunError>
where
    S: SpatialIndex + Send + Sync + 'static,
{
    let mut readers = Vec::new();
    while !engine.ready_to_go() {
        let (stream, addr) = listener.accept()?;
        match register(engine, stream, secret) {
            Ok(Some(reader)) => readers.push(reader),
            Ok(None) => {}
            Err(e) => warn!("Rejected connection from {}: {}", addr, e),
        }
    }
    Ok(readers)
}

/// Handshakes one incoming connection and files it as a control channel or a
/// result stream. Result streams get their own reader thread.
fn register<S>(
    engine: &Arc<Engine<S>>,
    stream: TcpStream,
    secret: &str,
) -> Result<Option<JoinHandle<()>>, NetError>
where
    S: SpatialIndex + Send + Sync + 'static,
{
    let mut connection = Connection::new(stream)?;
    connection.accept_handshake(secret)?;
    let payload = connection.receive_specific(MessageType::WorkerType)?;
    let expected = engine.expected_workers();

    match WorkerRole::from_payload(&payload)? {
        WorkerRole::Control => {
            if engine.registered_workers() >= expected {
                warn!("{} is surplus to {} workers", connection.peer(), expected);
                connection.shutdown();
                return Ok(None);
            }
            let peer = connection.peer().to_string();
            let id = engine.add_new_worker(WorkerConnection::new(connection));
            info!("Control channel {} is worker {}", peer, id);
            Ok(None)
        }
        WorkerRole::ResultStream => {
            if engine.render_connections() >= expected {
                warn!("{} is a surplus result stream", connection.peer());
                connection.shutdown();
                return Ok(None);
            }
            let count = engine.increment_render_connections();
            info!("Result stream {} connected ({}/{})", connection.peer(), count, expected);

            let engine = Arc::clone(engine);
            let reader = thread::Builder::new()
                .name(format!("results-{}", count - 1))
                .spawn(move || {
                    let peer = connection.peer().to_string();
                    if let Err(e) = process_worker_request(&engine, connection) {
                        error!("Result stream {} failed: {}", peer, e);
                    }
                })?;
            Ok(Some(reader))
        }
    }
}
