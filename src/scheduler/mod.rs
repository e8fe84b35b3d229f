//! The render scheduler.
//!
//! [`Ui::init`] splits the scheduler in two: the [`Ui`] handle used by whoever drives screen
//! switches, and the [`RenderLoop`] that owns the surface and must run on its own thread. All
//! drawing happens inside jobs executed one at a time by the render loop; jobs are handed over a
//! zero-capacity channel, so producers wait for the render thread to be ready.

use crate::{
    backend::{Backend, BackendError},
    config::DisplayConfig,
    screen::Screen,
    surface::{DrawError, PixelFormat, Surface},
    widget,
};
use log::{debug, error, info, trace, warn};
use std::{
    fmt,
    sync::{
        mpsc::{self, Receiver, SyncSender},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

mod task;

use task::TaskHandle;

/// A unit of work for the render thread, the only thing ever put on the command queue.
pub(crate) type Job = Box<dyn FnOnce(&mut Surface) -> Result<(), DrawError> + Send>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Upper bound on how long [`Ui::show_screen`] waits for each animation task to acknowledge
    /// its stop. `None` waits forever; a bound is meant for test harnesses, where a task that
    /// never stops should fail loudly instead of hanging.
    pub teardown_timeout: Option<Duration>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("unsupported depth of {0} bits per pixel")]
    UnsupportedDepth(u8),
    #[error("backend could not allocate the surface")]
    Backend(#[source] BackendError),
}

/// Why the render loop stopped early. Neither is recoverable: there is no partial-frame recovery.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("drawing failed")]
    Draw(#[from] DrawError),
    #[error("presenting the surface failed")]
    Present(#[from] BackendError),
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("the render loop has exited")]
    RenderLoopGone,
    #[error("{kind} task {task} panicked")]
    TaskPanicked { task: u64, kind: &'static str },
    #[error("{kind} task {task} did not acknowledge its stop within {waited:?}")]
    TeardownTimedOut {
        task: u64,
        kind: &'static str,
        waited: Duration,
    },
}

/// Driver side of the scheduler.
#[derive(Debug)]
pub struct Ui {
    queue: Option<SyncSender<Job>>,
    /// Tasks of the screen currently shown
    tasks: Vec<TaskHandle>,
    generation: u64,
    next_task: u64,
    config: SchedulerConfig,
}

/// Render thread side of the scheduler.
pub struct RenderLoop<B: Backend> {
    backend: B,
    surface: Surface,
    jobs: Receiver<Job>,
}

impl Ui {
    /// Allocates the surface through `backend`. Failing here is meant to be fatal: the render
    /// loop must not be started without a surface of the requested geometry.
    pub fn init<B: Backend>(
        mut backend: B,
        display: &DisplayConfig,
        config: SchedulerConfig,
    ) -> Result<(Ui, RenderLoop<B>), InitError> {
        let format = PixelFormat::from_bits_per_pixel(display.bits_per_pixel)
            .ok_or(InitError::UnsupportedDepth(display.bits_per_pixel))?;
        let surface = backend
            .allocate(display.width, display.height, format)
            .map_err(InitError::Backend)?;
        info!(
            "allocated {}x{} surface, {:?}",
            surface.width(),
            surface.height(),
            format
        );

        let (queue, jobs) = mpsc::sync_channel(0);
        Ok((
            Ui {
                queue: Some(queue),
                tasks: Vec::new(),
                generation: 0,
                next_task: 0,
                config,
            },
            RenderLoop {
                backend,
                surface,
                jobs,
            },
        ))
    }

    /// Number of screens shown so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replaces whatever is shown with `screen`.
    ///
    /// Blocks until every animation task of the previous screen has acknowledged its stop and
    /// the render thread has accepted the job drawing the new screen, but not until that job has
    /// run. After [`Ui::destroy`] this does nothing.
    pub fn show_screen(&mut self, screen: Arc<Screen>) -> Result<(), ScheduleError> {
        let Some(queue) = self.queue.clone() else {
            warn!("show_screen called after destroy, ignoring");
            return Ok(());
        };
        self.teardown()?;

        self.generation += 1;
        let generation = self.generation;

        let mut seeds = Vec::new();
        for shared in screen.widgets() {
            let guard = widget::lock(shared);
            if guard.frame_clock().is_some() {
                let (handle, seed) = task::pair(self.next_task, guard.kind(), shared.clone());
                self.next_task += 1;
                self.tasks.push(handle);
                seeds.push(seed);
            }
        }
        let animated = seeds.len();
        let widget_count = screen.widgets().len();

        let task_queue = queue.clone();
        let job: Job = Box::new(move |surface| {
            trace!("rendering screen {generation}");
            screen.run_hook();
            for shared in screen.widgets() {
                widget::lock(shared).render(surface)?;
            }
            for seed in seeds {
                seed.start(task_queue.clone());
            }
            Ok(())
        });
        if queue.send(job).is_err() {
            // The job and its seeds were dropped with it, so the new handles count as stopped
            error!("render loop is gone, screen {generation} will not be shown");
            return Err(ScheduleError::RenderLoopGone);
        }

        info!("screen {generation} scheduled with {widget_count} widgets, {animated} animated");
        Ok(())
    }

    /// Stops the current screen's animation tasks and closes the command queue; the render loop
    /// returns once the jobs already handed over are done. Calling this again does nothing.
    pub fn destroy(&mut self) {
        let Some(queue) = self.queue.take() else {
            return;
        };
        if let Err(err) = self.teardown() {
            warn!("teardown during destroy: {err}");
        }
        drop(queue);
        info!("command queue closed");
    }

    /// Stops every registered task, one handshake at a time, and empties the registry.
    fn teardown(&mut self) -> Result<(), ScheduleError> {
        let tasks = std::mem::take(&mut self.tasks);
        if tasks.is_empty() {
            return Ok(());
        }
        debug!(
            "stopping {} animation tasks of screen {}",
            tasks.len(),
            self.generation
        );
        // On error the remaining handles are dropped, which stops their tasks without waiting
        for task in tasks {
            let id = task.id();
            task.stop(self.config.teardown_timeout)?;
            trace!("task {id} stopped");
        }
        Ok(())
    }
}

impl Drop for Ui {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<B: Backend> fmt::Debug for RenderLoop<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderLoop")
            .field("surface", &self.surface)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> RenderLoop<B> {
    /// Executes jobs one at a time, presenting the surface after each, until the queue is closed
    /// or something fails. The backend is released either way.
    pub fn run(self) -> Result<(), RenderError> {
        let RenderLoop {
            mut backend,
            mut surface,
            jobs,
        } = self;
        info!("render loop started");

        let mut frames = 0usize;
        let result = Self::drain(&jobs, &mut surface, &mut backend, &mut frames);
        drop(jobs);
        backend.release();

        match &result {
            Ok(()) => info!("command queue closed after {frames} frames, render loop exiting"),
            Err(err) => error!("render loop aborted after {frames} frames: {err}"),
        }
        result
    }

    fn drain(
        jobs: &Receiver<Job>,
        surface: &mut Surface,
        backend: &mut B,
        frames: &mut usize,
    ) -> Result<(), RenderError> {
        for job in jobs.iter() {
            job(surface)?;
            backend.present(surface)?;
            *frames += 1;
        }
        Ok(())
    }

    /// Runs the loop on a dedicated `render` thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<Result<(), RenderError>>> {
        thread::Builder::new()
            .name("render".to_string())
            .spawn(move || self.run())
    }
}

#[cfg(test)]
mod test;
