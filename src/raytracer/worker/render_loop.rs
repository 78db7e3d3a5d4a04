use crate::raytracer::error::NetError;
use crate::raytracer::renderer::{Continuation, RenderOutcome, Renderer};
use crate::raytracer::worker::scheduler_connection::ResultStream;
use crate::raytracer::worker::work_queue::{WorkItem, WorkQueue};
use log::{debug, trace};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RenderStats {
    pub pixels: usize,
    pub handoffs: usize,
    pub failures: usize,
}

/// Drains `queue` until it is both empty and finished, reporting every
/// outcome on the result stream. Ends by sending RenderComplete.
pub fn render_loop<R: Renderer>(
    renderer: &R,
    queue: &WorkQueue,
    results: &mut ResultStream,
) -> Result<RenderStats, NetError> {
    let mut stats = RenderStats::default();

    while let Some(item) = queue.next_blocking() {
        let (ray, x, y, outcome) = match item {
            WorkItem::Origin { ray, x, y } => {
                let outcome = renderer.render_origin(&ray, x, y);
                (ray, x, y, outcome)
            }
            WorkItem::Continuation(c) => {
                let outcome = renderer.resume(&c.ray, c.x, c.y, &c.token);
                (c.ray, c.x, c.y, outcome)
            }
        };

        match outcome {
            RenderOutcome::Color(color) => {
                results.send_result(x, y, color)?;
                stats.pixels += 1;
            }
            RenderOutcome::Exited(token) => {
                trace!("({}, {}) leaves for partition {:?}", x, y, token.partition_id());
                results.send_unresolved(&Continuation { ray, x, y, token })?;
                stats.handoffs += 1;
            }
            RenderOutcome::Failed => {
                debug!("Render failed for ({}, {})", x, y);
                results.send_result(x, y, renderer.background())?;
                stats.pixels += 1;
                stats.failures += 1;
            }
        }
    }

    results.send_complete()?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raytracer::net::{connection_pair, MessageType};
    use crate::raytracer::ray::Ray;
    use crate::raytracer::renderer::ResumeToken;
    use crate::raytracer::scheduler::worker_connection::decode_result;
    use glam::{Vec3, Vec4};

    /// Pixels in column 0 exit to partition 1, column 1 fails, everything
    /// else shades to its x coordinate. Resumed rays shade to 9.
    struct StubRenderer;

    impl Renderer for StubRenderer {
        fn render_origin(&self, _ray: &Ray, x: u32, _y: u32) -> RenderOutcome {
            match x {
                0 => RenderOutcome::Exited(ResumeToken::with_partition(vec![0xee; 8], 1)),
                1 => RenderOutcome::Failed,
                _ => RenderOutcome::Color(Vec4::splat(x as f32)),
            }
        }

        fn resume(&self, _ray: &Ray, _x: u32, _y: u32, _token: &ResumeToken) -> RenderOutcome {
            RenderOutcome::Color(Vec4::splat(9.0))
        }

        fn background(&self) -> Vec4 {
            Vec4::new(0.1, 0.1, 0.1, 1.0)
        }
    }

    #[test]
    fn test_outcomes_are_reported() {
        let (worker, mut scheduler) = connection_pair();
        let queue = WorkQueue::new();
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        for x in 0..3 {
            queue.push_origin(ray, x, 4);
        }
        queue.push_continuation(Continuation {
            ray,
            x: 6,
            y: 6,
            token: ResumeToken::with_partition(Vec::new(), 0),
        });
        queue.finish();

        let stats = render_loop(&StubRenderer, &queue, &mut ResultStream::new(worker)).unwrap();
        assert_eq!(
            stats,
            RenderStats {
                pixels: 3,
                handoffs: 1,
                failures: 1
            }
        );

        let handoff = scheduler.receive_specific(MessageType::UnresolvedRay).unwrap();
        let continuation = Continuation::from_payload(&handoff).unwrap();
        assert_eq!((continuation.x, continuation.y), (0, 4));
        assert_eq!(continuation.token.partition_id(), Some(1));
        assert_eq!(continuation.token.state(), &[0xee; 8]);

        let failed = scheduler.receive_specific(MessageType::WorkerResult).unwrap();
        assert_eq!(decode_result(&failed).unwrap(), (1, 4, Vec4::new(0.1, 0.1, 0.1, 1.0)));

        let shaded = scheduler.receive_specific(MessageType::WorkerResult).unwrap();
        assert_eq!(decode_result(&shaded).unwrap(), (2, 4, Vec4::splat(2.0)));

        let resumed = scheduler.receive_specific(MessageType::WorkerResult).unwrap();
        assert_eq!(decode_result(&resumed).unwrap(), (6, 6, Vec4::splat(9.0)));

        scheduler.receive_specific(MessageType::RenderComplete).unwrap();
    }

    #[test]
    fn test_transient_empty_queue_does_not_end_loop() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let (worker, mut scheduler) = connection_pair();
        let queue = Arc::new(WorkQueue::new());
        let render = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || render_loop(&StubRenderer, &queue, &mut ResultStream::new(worker)))
        };

        thread::sleep(Duration::from_millis(20));
        queue.push_origin(Ray::new(Vec3::ZERO, Vec3::Z), 5, 0);
        let result = scheduler.receive_specific(MessageType::WorkerResult).unwrap();
        assert_eq!(decode_result(&result).unwrap().0, 5);
        assert!(!render.is_finished());

        queue.finish();
        assert_eq!(render.join().unwrap().unwrap().pixels, 1);
        scheduler.receive_specific(MessageType::RenderComplete).unwrap();
    }
}
