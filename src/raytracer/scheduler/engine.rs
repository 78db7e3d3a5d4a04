use crate::raytracer::config::{ASSIGN_BACKOFF, DRAIN_POLL, LOW_WATER_MARK};
use crate::raytracer::error::{EngineError, NetError};
use crate::raytracer::exporter::Exporter;
use crate::raytracer::framebuffer::{Framebuffer, PixelWrite};
use crate::raytracer::renderer::{Continuation, SpatialIndex};
use crate::raytracer::scene::{ModelDescriptor, SceneAssignment};
use crate::raytracer::scheduler::cells::{Cell, CellPartitioner};
use glam::Vec4;
use log::{debug, error, info, trace, warn};
use parking_lot::{Condvar, Mutex};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// The scheduler's view of one worker's control channel.
pub trait WorkerLink: Send + Sync {
    fn send_scene(&self, assignment: &SceneAssignment) -> Result<(), NetError>;
    fn send_models(&self, models: &[ModelDescriptor]) -> Result<(), NetError>;
    fn send_cell(&self, cell: &Cell) -> Result<(), NetError>;
    /// Forwards an unresolved-ray payload unchanged.
    fn forward_ray(&self, payload: &[u8]) -> Result<(), NetError>;
    fn queue_size(&self) -> Result<usize, NetError>;
    fn send_complete(&self) -> Result<(), NetError>;
    fn await_complete(&self) -> Result<(), NetError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    AwaitingWorkers,
    Assigning,
    Draining,
    Completing,
    Done,
}

#[derive(Clone, Debug)]
pub struct Job {
    pub scene: PathBuf,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub grain_x: u32,
    pub grain_y: u32,
    pub background: Vec4,
}

struct Progress {
    completed: usize,
    total: usize,
    fatal: Option<EngineError>,
}

/// First worker, in registration order, whose queue is below `threshold`.
pub fn pick_worker(depths: &[usize], threshold: usize) -> Option<usize> {
    depths.iter().position(|&depth| depth < threshold)
}

pub struct SchedulerEngine<W: WorkerLink, S: SpatialIndex> {
    index: S,
    state: Mutex<EngineState>,
    job: Mutex<Option<Job>>,
    models: Mutex<Vec<ModelDescriptor>>,
    expected_workers: AtomicUsize,
    render_connections: AtomicUsize,
    workers: Mutex<Vec<Arc<W>>>,
    image: Mutex<Option<Framebuffer>>,
    progress: Mutex<Progress>,
    progress_changed: Condvar,
}

impl<W: WorkerLink, S: SpatialIndex> SchedulerEngine<W, S> {
    pub fn new(index: S) -> Self {
        Self {
            index,
            state: Mutex::new(EngineState::Idle),
            job: Mutex::new(None),
            models: Mutex::new(Vec::new()),
            expected_workers: AtomicUsize::new(0),
            render_connections: AtomicUsize::new(0),
            workers: Mutex::new(Vec::new()),
            image: Mutex::new(None),
            progress: Mutex::new(Progress {
                completed: 0,
                total: 0,
                fatal: None,
            }),
            progress_changed: Condvar::new(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    fn set_state(&self, next: EngineState) {
        let mut state = self.state.lock();
        debug!("Engine {:?} -> {:?}", *state, next);
        *state = next;
    }

    /// Moves Idle to AwaitingWorkers; refuses once the job has started.
    fn configure(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        match *state {
            EngineState::Idle | EngineState::AwaitingWorkers => {
                *state = EngineState::AwaitingWorkers;
                Ok(())
            }
            _ => Err(EngineError::AlreadyEngaged),
        }
    }

    pub fn set_scene(&self, job: Job) -> Result<(), EngineError> {
        self.configure()?;
        let total = job.width as usize * job.height as usize;
        *self.image.lock() = Some(Framebuffer::new(
            job.width as usize,
            job.height as usize,
            job.background,
        ));
        {
            let mut progress = self.progress.lock();
            progress.completed = 0;
            progress.total = total;
        }
        info!(
            "Scene {} at {}x{}, cells of {}x{}",
            job.scene.display(),
            job.width,
            job.height,
            job.grain_x,
            job.grain_y
        );
        *self.job.lock() = Some(job);
        Ok(())
    }

    pub fn add_model_to_scene(&self, model: ModelDescriptor) -> Result<(), EngineError> {
        self.configure()?;
        debug!("Model {} ({})", model.filename, model.material);
        self.models.lock().push(model);
        Ok(())
    }

    pub fn wait_for_workers(&self, count: usize) {
        self.expected_workers.store(count, Ordering::SeqCst);
    }

    /// Registers a worker's control channel and returns its id.
    pub fn add_new_worker(&self, link: W) -> usize {
        let mut workers = self.workers.lock();
        let id = workers.len();
        workers.push(Arc::new(link));
        info!("Worker {} registered", id);
        id
    }

    pub fn increment_render_connections(&self) -> usize {
        self.render_connections.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn expected_workers(&self) -> usize {
        self.expected_workers.load(Ordering::SeqCst)
    }

    pub fn registered_workers(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn render_connections(&self) -> usize {
        self.render_connections.load(Ordering::SeqCst)
    }

    pub fn ready_to_go(&self) -> bool {
        let expected = self.expected_workers.load(Ordering::SeqCst);
        let registered = self.workers.lock().len();
        registered == expected && self.render_connections.load(Ordering::SeqCst) == expected
    }

    #[cfg(test)]
    pub fn completed_pixels(&self) -> usize {
        self.progress.lock().completed
    }

    fn links(&self) -> Vec<Arc<W>> {
        self.workers.lock().clone()
    }

    fn fail(&self, err: EngineError) {
        let mut progress = self.progress.lock();
        if progress.fatal.is_none() {
            progress.fatal = Some(err);
        }
        self.progress_changed.notify_all();
    }

    fn check_fatal(&self) -> Result<(), EngineError> {
        match self.progress.lock().fatal.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Runs the job to completion: distributes the scene, balances cells
    /// across workers, waits for every pixel, runs the completion barrier and
    /// writes the image through `sink`.
    pub fn engage(&self, sink: &dyn Exporter) -> Result<(), EngineError> {
        let job = {
            let mut state = self.state.lock();
            match *state {
                EngineState::Idle => return Err(EngineError::NoScene),
                EngineState::AwaitingWorkers => {}
                _ => return Err(EngineError::AlreadyEngaged),
            }
            let job = self.job.lock().clone().ok_or(EngineError::NoScene)?;
            let expected = self.expected_workers.load(Ordering::SeqCst);
            if expected == 0 {
                return Err(EngineError::NoWorkers);
            }
            if !self.ready_to_go() {
                return Err(EngineError::NotReady {
                    registered: self.workers.lock().len(),
                    connected: self.render_connections.load(Ordering::SeqCst),
                    expected,
                });
            }
            *state = EngineState::Assigning;
            job
        };

        let started = Instant::now();
        let links = self.links();
        self.distribute_scene(&job, &links)?;
        self.assign_cells(&job, &links)?;

        self.set_state(EngineState::Draining);
        self.drain()?;

        self.set_state(EngineState::Completing);
        for (id, link) in links.iter().enumerate() {
            link.send_complete().map_err(|source| EngineError::Worker { worker: id, source })?;
        }
        for (id, link) in links.iter().enumerate() {
            link.await_complete().map_err(|source| EngineError::Worker { worker: id, source })?;
            debug!("Worker {} drained", id);
        }

        {
            let image = self.image.lock();
            let framebuffer = image.as_ref().ok_or(EngineError::NoScene)?;
            sink.export(framebuffer, &job.output)?;
        }

        let elapsed = started.elapsed();
        let millis = elapsed.as_millis();
        info!(
            "Scene complete in {}m {}s {}ms",
            millis / 60_000,
            (millis / 1000) % 60,
            millis % 1000
        );
        self.set_state(EngineState::Done);
        Ok(())
    }

    fn distribute_scene(&self, job: &Job, links: &[Arc<W>]) -> Result<(), EngineError> {
        let models = self.models.lock().clone();
        let filename = job.scene.to_string_lossy().into_owned();
        for (id, link) in links.iter().enumerate() {
            let assignment = SceneAssignment {
                filename: filename.clone(),
                width: job.width,
                height: job.height,
                worker_id: id as u32,
                worker_count: links.len() as u32,
            };
            link.send_scene(&assignment)
                .and_then(|_| link.send_models(&models))
                .map_err(|source| EngineError::Worker { worker: id, source })?;
        }
        info!("Scene sent to {} workers ({} models)", links.len(), models.len());
        Ok(())
    }

    fn assign_cells(&self, job: &Job, links: &[Arc<W>]) -> Result<(), EngineError> {
        let mut cells = CellPartitioner::new(job.width, job.height, job.grain_x, job.grain_y);
        info!("Assigning {} cells", cells.total_cells());

        // Everyone starts with one cell.
        for (id, link) in links.iter().enumerate() {
            match cells.next() {
                Some(cell) => self.assign(id, link, &cell)?,
                None => break,
            }
        }

        for cell in cells {
            let id = self.wait_for_capacity(links)?;
            self.assign(id, &links[id], &cell)?;
        }
        Ok(())
    }

    fn assign(&self, id: usize, link: &W, cell: &Cell) -> Result<(), EngineError> {
        link.send_cell(cell)
            .map_err(|source| EngineError::Worker { worker: id, source })?;
        trace!("Cell {:?} ({} pixels) -> worker {}", cell, cell.pixel_count(), id);
        Ok(())
    }

    fn wait_for_capacity(&self, links: &[Arc<W>]) -> Result<usize, EngineError> {
        loop {
            self.check_fatal()?;

            let mut depths = Vec::with_capacity(links.len());
            for (id, link) in links.iter().enumerate() {
                let depth = link
                    .queue_size()
                    .map_err(|source| EngineError::Worker { worker: id, source })?;
                depths.push(depth);
            }

            if let Some(id) = pick_worker(&depths, LOW_WATER_MARK) {
                return Ok(id);
            }
            thread::sleep(ASSIGN_BACKOFF);
        }
    }

    fn drain(&self) -> Result<(), EngineError> {
        let mut progress = self.progress.lock();
        loop {
            if let Some(err) = progress.fatal.take() {
                return Err(err);
            }
            if progress.completed >= progress.total {
                return Ok(());
            }
            debug!("{}/{} pixels", progress.completed, progress.total);
            self.progress_changed.wait_for(&mut progress, DRAIN_POLL);
        }
    }

    /// Records one finished pixel.
    pub fn worker_result(&self, x: u32, y: u32, color: Vec4) {
        let write = match self.image.lock().as_mut() {
            Some(framebuffer) => framebuffer.set_pixel(x as usize, y as usize, color),
            None => {
                warn!("Result for ({}, {}) before any scene was set", x, y);
                return;
            }
        };

        match write {
            PixelWrite::Fresh => {
                let mut progress = self.progress.lock();
                progress.completed += 1;
                if progress.completed >= progress.total {
                    self.progress_changed.notify_all();
                }
            }
            PixelWrite::Overwrite => warn!("Duplicate result for pixel ({}, {})", x, y),
            PixelWrite::OutOfBounds => warn!("Result for pixel ({}, {}) is outside the image", x, y),
        }
    }

    /// Forwards an unresolved ray to the worker owning the partition named by
    /// its token. Returns that worker's id.
    pub fn unresolved_ray(&self, payload: &[u8]) -> Result<usize, EngineError> {
        let continuation = match Continuation::from_payload(payload) {
            Ok(c) => c,
            Err(e) => {
                error!("Unreadable unresolved ray: {}", e);
                self.fail(EngineError::BadRay(NetError::Malformed("unresolved ray")));
                return Err(EngineError::BadRay(e));
            }
        };

        let owner = self.index.owner_of(&continuation.token);
        let link = owner.and_then(|id| self.workers.lock().get(id).cloned());
        let (Some(id), Some(link)) = (owner, link) else {
            let partition = continuation.token.partition_id();
            error!(
                "Ray for pixel ({}, {}) entered partition {:?}, which no worker owns",
                continuation.x, continuation.y, partition
            );
            self.fail(EngineError::Routing(partition));
            return Err(EngineError::Routing(partition));
        };

        link.forward_ray(payload)
            .map_err(|source| EngineError::Worker { worker: id, source })?;
        trace!(
            "Ray for ({}, {}) forwarded to worker {}",
            continuation.x,
            continuation.y,
            id
        );
        Ok(id)
    }
}
