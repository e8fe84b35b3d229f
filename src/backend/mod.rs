use crate::surface::{PixelFormat, Surface};

mod memory;
mod tui;

pub use memory::{FrameProbe, MemoryBackend};
pub use tui::TerminalBackend;

/// Largest surface any backend will hand out, in pixels.
pub const MAX_SURFACE_PIXELS: u64 = 4096 * 4096;

/// The graphics collaborator the render loop presents through. Drawing itself happens directly on
/// the [`Surface`]; a backend only has to hand one out and show it.
pub trait Backend: Send + 'static {
    /// Creates the surface everything will be drawn on. Called exactly once, before the render
    /// loop starts.
    fn allocate(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Surface, BackendError>;

    /// Called after every render job with the finished frame. This being called doesn't
    /// necessarily mean that anything changed on the surface.
    fn present(&mut self, surface: &Surface) -> Result<(), BackendError>;

    /// Gives back whatever the backend holds. Called once when the render loop ends.
    fn release(&mut self);
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("cannot allocate a {width}x{height} surface: {reason}")]
    Allocation {
        width: u32,
        height: u32,
        reason: String,
    },
    #[error("presenting frame #{0} failed")]
    Present(usize),
    #[error("backend used after release")]
    Released,
    #[error("terminal i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared geometry check for backends without hardware limits of their own.
pub(crate) fn check_geometry(width: u32, height: u32) -> Result<(), BackendError> {
    let reason = if width == 0 || height == 0 {
        "surface must not be empty"
    } else if u64::from(width) * u64::from(height) > MAX_SURFACE_PIXELS {
        "surface is too large"
    } else {
        return Ok(());
    };
    Err(BackendError::Allocation {
        width,
        height,
        reason: reason.to_string(),
    })
}
