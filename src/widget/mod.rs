use crate::surface::{DrawError, Surface};
use serde::Deserialize;
use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

mod animation;
mod image;
mod text;

pub use animation::{Animation, FrameClock, MIN_FRAME_DELAY};
pub use image::Image;
pub use text::{resolve_font, TextBox};

/// Implemented by anything that can be placed on a screen.
pub trait Widget: Send {
    /// Short name of the widget type, used in logs and errors.
    fn kind(&self) -> &'static str;

    /// Performs the expensive, fallible setup (decoding assets, looking up fonts). Must succeed
    /// before the first [`Widget::render`].
    fn init(&mut self) -> Result<(), WidgetError>;

    /// Draws the current state onto the surface. Rendering unchanged state twice produces the
    /// same pixels, except for animations which advance a frame per call.
    fn render(&mut self, surface: &mut Surface) -> Result<(), DrawError>;

    /// `Some` for widgets that need a ticking task while their screen is shown.
    fn frame_clock(&self) -> Option<FrameClock> {
        None
    }
}

/// Widgets are shared between their screen and any animation task ticking them. They are only
/// ever locked for rendering on the render thread, or briefly to read their clock.
pub type SharedWidget = Arc<Mutex<dyn Widget>>;

pub fn shared<W: Widget + 'static>(widget: W) -> SharedWidget {
    Arc::new(Mutex::new(widget))
}

/// Widget state stays consistent across a panicking render, so poisoning is ignored.
pub(crate) fn lock(widget: &SharedWidget) -> MutexGuard<'_, dyn Widget + 'static> {
    widget.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, thiserror::Error)]
pub enum WidgetError {
    #[error("no built-in font {name:?} at size {size}")]
    UnknownFont { name: String, size: u32 },
    #[error("could not read {path}")]
    CouldNotRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not decode {path}")]
    Decode {
        path: PathBuf,
        #[source]
        source: ::image::ImageError,
    },
    #[error("animation has no frames")]
    NoFrames,
    #[error("frame #{index} is {got:?}, expected {expected:?} like the first frame")]
    FrameSize {
        index: usize,
        got: (u32, u32),
        expected: (u32, u32),
    },
}

/// The closed set of widgets a configuration file can describe. Serialized externally tagged,
/// e.g. `{"TextBox": {...}}`.
#[derive(Debug, Deserialize)]
pub enum AnyWidget {
    TextBox(TextBox),
    Image(Image),
    Animation(Animation),
}

impl AnyWidget {
    fn inner(&self) -> &dyn Widget {
        match self {
            AnyWidget::TextBox(w) => w,
            AnyWidget::Image(w) => w,
            AnyWidget::Animation(w) => w,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Widget {
        match self {
            AnyWidget::TextBox(w) => w,
            AnyWidget::Image(w) => w,
            AnyWidget::Animation(w) => w,
        }
    }
}

impl Widget for AnyWidget {
    fn kind(&self) -> &'static str {
        self.inner().kind()
    }

    fn init(&mut self) -> Result<(), WidgetError> {
        self.inner_mut().init()
    }

    fn render(&mut self, surface: &mut Surface) -> Result<(), DrawError> {
        self.inner_mut().render(surface)
    }

    fn frame_clock(&self) -> Option<FrameClock> {
        self.inner().frame_clock()
    }
}
