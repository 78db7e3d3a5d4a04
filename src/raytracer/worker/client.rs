use crate::raytracer::config::WorkerConfig;
use crate::raytracer::error::RunError;
use crate::raytracer::net::{Connection, WorkerRole};
use crate::raytracer::renderer::PartitionedRenderer;
use crate::raytracer::scene::Scene;
use crate::raytracer::worker::render_loop::{render_loop, RenderStats};
use crate::raytracer::worker::scheduler_connection::{open, ControlStats, ResultStream, SchedulerConnection};
use crate::raytracer::worker::work_queue::WorkQueue;
use log::{error, info};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct WorkerSummary {
    pub worker_id: u32,
    pub control: ControlStats,
    pub render: RenderStats,
}

/// Connects both channels to the scheduler and renders until released.
pub fn run(config: &WorkerConfig) -> Result<WorkerSummary, RunError> {
    let address = config.address();
    info!("Connecting to scheduler at {}", address);
    let control = open(address.as_str(), &config.secret, WorkerRole::Control)?;
    let results = open(address.as_str(), &config.secret, WorkerRole::ResultStream)?;
    run_with(control, results)
}

/// Worker body over already registered connections.
pub fn run_with(control: Connection, results: Connection) -> Result<WorkerSummary, RunError> {
    let mut scheduler = SchedulerConnection::new(control);
    let (assignment, models) = scheduler.receive_assignment()?;
    info!(
        "Assigned worker {} of {}: {} at {}x{} with {} models",
        assignment.worker_id,
        assignment.worker_count,
        assignment.filename,
        assignment.width,
        assignment.height,
        models.len()
    );

    let load_start = Instant::now();
    let scene = Scene::load(
        Path::new(&assignment.filename),
        &models,
        assignment.width,
        assignment.height,
    )?;
    let renderer = PartitionedRenderer::from_scene(
        &scene,
        assignment.worker_id as usize,
        assignment.worker_count as usize,
    );
    info!(
        "Scene ready in {:.3}s: {} triangles, {} of {} regions owned",
        load_start.elapsed().as_secs_f32(),
        scene.triangles.len(),
        renderer.grid().owned_by(assignment.worker_id as usize),
        renderer.grid().region_count()
    );

    let queue = Arc::new(WorkQueue::new());
    let render_thread = {
        let queue = Arc::clone(&queue);
        thread::Builder::new()
            .name(format!("render-{}", assignment.worker_id))
            .spawn(move || render_loop(&renderer, &queue, &mut ResultStream::new(results)))?
    };

    let served = scheduler.serve(&queue, &scene.camera, assignment.width, assignment.height);
    if let Err(e) = &served {
        error!("Control connection failed: {}", e);
        // Let the render thread drain what it has and exit.
        queue.finish();
    }

    let rendered = render_thread.join().map_err(|_| RunError::RenderThread)?;
    let control = served?;
    let render = rendered?;
    scheduler.send_complete()?;

    Ok(WorkerSummary {
        worker_id: assignment.worker_id,
        control,
        render,
    })
}
