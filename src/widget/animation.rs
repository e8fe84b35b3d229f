use crate::{
    surface::{DrawError, Sprite, Surface},
    widget::{Widget, WidgetError},
};
use embedded_graphics::{
    prelude::{Point, Size},
    primitives::Rectangle,
};
use image::{codecs::gif::GifDecoder, imageops, AnimationDecoder};
use serde::Deserialize;
use std::{fs::File, io::BufReader, path::PathBuf, sync::Arc, time::Duration};

/// Frames asking for less than this (including the common "0") are held this long instead.
pub const MIN_FRAME_DELAY: Duration = Duration::from_millis(20);

/// A frame sequence decoded from a GIF, played back one frame per render.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Animation {
    pub file: PathBuf,
    pub x: i32,
    pub y: i32,

    #[serde(skip)]
    frames: Option<Frames>,
    #[serde(skip)]
    frame: usize,
}

/// All frames stacked vertically in one sprite, plus how long each one stays up.
#[derive(Debug)]
struct Frames {
    sheet: Sprite,
    size: Size,
    delays: Arc<[Duration]>,
}

/// Snapshot of an animation's schedule, owned by the task that ticks it.
///
/// The clock tracks which frame is currently on screen; its [`FrameClock::delay`] is how long
/// that frame should stay up before the next render is due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameClock {
    delays: Arc<[Duration]>,
    shown: usize,
}

impl FrameClock {
    pub fn new(delays: Arc<[Duration]>, shown: usize) -> FrameClock {
        FrameClock { delays, shown }
    }

    pub fn shown(&self) -> usize {
        self.shown
    }

    pub fn delay(&self) -> Duration {
        self.delays
            .get(self.shown)
            .copied()
            .unwrap_or(MIN_FRAME_DELAY)
    }

    /// Moves on to the next frame, wrapping after the last one.
    pub fn advance(&mut self) {
        if !self.delays.is_empty() {
            self.shown = (self.shown + 1) % self.delays.len();
        }
    }
}

impl Animation {
    /// Builds an already-initialised animation from in-memory frames. All frames must share the
    /// size of the first.
    pub fn from_frames(
        position: Point,
        frames: Vec<(Sprite, Duration)>,
    ) -> Result<Animation, WidgetError> {
        Ok(Animation {
            file: PathBuf::new(),
            x: position.x,
            y: position.y,
            frames: Some(Frames::stack(frames)?),
            frame: 0,
        })
    }

    /// Index of the frame the next render will draw.
    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn frame_count(&self) -> usize {
        self.frames.as_ref().map_or(0, |f| f.delays.len())
    }

    /// Width and height of a single frame, once decoded.
    pub fn size(&self) -> Option<Size> {
        self.frames.as_ref().map(|f| f.size)
    }

    fn load(&self) -> Result<Frames, WidgetError> {
        let path = &self.file;
        let file = File::open(path).map_err(|source| WidgetError::CouldNotRead {
            path: path.clone(),
            source,
        })?;
        let decode_err = |source| WidgetError::Decode {
            path: path.clone(),
            source,
        };
        let decoder = GifDecoder::new(BufReader::new(file)).map_err(decode_err)?;
        let frames = decoder
            .into_frames()
            .collect_frames()
            .map_err(decode_err)?
            .into_iter()
            .map(|frame| {
                let (numer, denom) = frame.delay().numer_denom_ms();
                let delay = Duration::from_micros(u64::from(numer) * 1000 / u64::from(denom.max(1)));
                (frame.into_buffer(), delay)
            })
            .collect();
        Frames::stack(frames)
    }
}

impl Frames {
    fn stack(frames: Vec<(Sprite, Duration)>) -> Result<Frames, WidgetError> {
        let (first, _) = frames.first().ok_or(WidgetError::NoFrames)?;
        let (w, h) = first.dimensions();

        let mut sheet = Sprite::new(w, h * frames.len() as u32);
        let mut delays = Vec::with_capacity(frames.len());
        for (index, (frame, delay)) in frames.iter().enumerate() {
            if frame.dimensions() != (w, h) {
                return Err(WidgetError::FrameSize {
                    index,
                    got: frame.dimensions(),
                    expected: (w, h),
                });
            }
            imageops::replace(&mut sheet, frame, 0, i64::from(h) * index as i64);
            delays.push((*delay).max(MIN_FRAME_DELAY));
        }

        Ok(Frames {
            sheet,
            size: Size::new(w, h),
            delays: delays.into(),
        })
    }
}

impl Widget for Animation {
    fn kind(&self) -> &'static str {
        "Animation"
    }

    fn init(&mut self) -> Result<(), WidgetError> {
        if self.frames.is_some() {
            return Ok(());
        }
        log::info!("loading animation {}", self.file.display());
        let frames = self.load()?;
        log::debug!(
            "{} has {} frames of {}x{}",
            self.file.display(),
            frames.delays.len(),
            frames.size.width,
            frames.size.height
        );
        self.frames = Some(frames);
        self.frame = 0;
        Ok(())
    }

    fn render(&mut self, surface: &mut Surface) -> Result<(), DrawError> {
        let frames = self
            .frames
            .as_ref()
            .ok_or(DrawError::NotInitialised("Animation"))?;
        let src = Rectangle::new(
            Point::new(0, (frames.size.height as usize * self.frame) as i32),
            frames.size,
        );
        surface.blit(Point::new(self.x, self.y), &frames.sheet, src)?;
        self.frame = (self.frame + 1) % frames.delays.len();
        Ok(())
    }

    /// The clock starts at the frame most recently drawn.
    fn frame_clock(&self) -> Option<FrameClock> {
        let frames = self.frames.as_ref()?;
        let count = frames.delays.len();
        Some(FrameClock::new(
            frames.delays.clone(),
            (self.frame + count - 1) % count,
        ))
    }
}
