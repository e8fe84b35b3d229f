//! Screens of widgets drawn on a single render thread.
//!
//! Everything that touches the [`surface::Surface`] runs as a job on the thread executing the
//! [`RenderLoop`]. A [`Ui`] hands it whole screens to draw, and every animated widget of the
//! shown screen gets a small task that hands it a job each time its next frame is due. Switching
//! screens stops those tasks before anything of the new screen is drawn.

pub mod backend;
pub mod color;
pub mod config;
pub mod scheduler;
pub mod screen;
pub mod surface;
pub mod widget;

pub use scheduler::{InitError, RenderError, RenderLoop, ScheduleError, SchedulerConfig, Ui};
pub use screen::Screen;
