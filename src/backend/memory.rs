use crate::{
    backend::{check_geometry, Backend, BackendError},
    surface::{PixelFormat, Surface},
};
use std::{
    sync::{Arc, Mutex, PoisonError},
    thread,
    time::Duration,
};

/// Headless backend. Presented frames are kept in memory and can be inspected through a
/// [`FrameProbe`] from any thread.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    log: Arc<Mutex<FrameLog>>,
    present_delay: Option<Duration>,
    fail_after: Option<usize>,
}

#[derive(Debug, Default)]
struct FrameLog {
    presented: usize,
    last: Option<Surface>,
    released: bool,
}

/// Read side of a [`MemoryBackend`].
#[derive(Debug, Clone)]
pub struct FrameProbe {
    log: Arc<Mutex<FrameLog>>,
}

impl MemoryBackend {
    pub fn new() -> (MemoryBackend, FrameProbe) {
        let backend = MemoryBackend::default();
        let probe = FrameProbe {
            log: backend.log.clone(),
        };
        (backend, probe)
    }

    /// Sleeps for `delay` inside every present, simulating a slow display.
    pub fn with_present_delay(mut self, delay: Duration) -> MemoryBackend {
        self.present_delay = Some(delay);
        self
    }

    /// Fails every present after the first `frames` ones.
    pub fn failing_after(mut self, frames: usize) -> MemoryBackend {
        self.fail_after = Some(frames);
        self
    }

    fn log(&self) -> std::sync::MutexGuard<'_, FrameLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend for MemoryBackend {
    fn allocate(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Surface, BackendError> {
        check_geometry(width, height)?;
        Ok(Surface::new(width, height, format))
    }

    fn present(&mut self, surface: &Surface) -> Result<(), BackendError> {
        if let Some(delay) = self.present_delay {
            thread::sleep(delay);
        }
        let fail_after = self.fail_after;
        let mut log = self.log();
        if log.released {
            return Err(BackendError::Released);
        }
        if fail_after.map_or(false, |n| log.presented >= n) {
            return Err(BackendError::Present(log.presented));
        }
        log.presented += 1;
        log.last = Some(surface.clone());
        Ok(())
    }

    fn release(&mut self) {
        self.log().released = true;
    }
}

impl FrameProbe {
    fn log(&self) -> std::sync::MutexGuard<'_, FrameLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of frames successfully presented so far.
    pub fn presented(&self) -> usize {
        self.log().presented
    }

    pub fn last_frame(&self) -> Option<Surface> {
        self.log().last.clone()
    }

    pub fn released(&self) -> bool {
        self.log().released
    }
}
