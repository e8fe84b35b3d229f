use crate::{
    surface::{DrawError, Sprite, Surface},
    widget::{Widget, WidgetError},
};
use embedded_graphics::{
    prelude::{Point, Size},
    primitives::Rectangle,
};
use serde::Deserialize;
use std::{fs::File, io::BufReader, path::PathBuf};

/// A still picture, drawn at `(x, y)` at its natural size.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Image {
    pub file: PathBuf,
    pub x: i32,
    pub y: i32,

    #[serde(skip)]
    sprite: Option<Sprite>,
}

impl Image {
    /// Creates an image from already decoded pixels.
    pub fn from_sprite(position: Point, sprite: Sprite) -> Image {
        Image {
            file: PathBuf::new(),
            x: position.x,
            y: position.y,
            sprite: Some(sprite),
        }
    }

    fn load(&self) -> Result<Sprite, WidgetError> {
        let path = &self.file;
        let file = File::open(path).map_err(|source| WidgetError::CouldNotRead {
            path: path.clone(),
            source,
        })?;
        let decoded = ::image::ImageReader::new(BufReader::new(file))
            .with_guessed_format()
            .map_err(|source| WidgetError::CouldNotRead {
                path: path.clone(),
                source,
            })?
            .decode()
            .map_err(|source| WidgetError::Decode {
                path: path.clone(),
                source,
            })?;
        Ok(decoded.into_rgba8())
    }
}

impl Widget for Image {
    fn kind(&self) -> &'static str {
        "Image"
    }

    fn init(&mut self) -> Result<(), WidgetError> {
        if self.sprite.is_some() {
            return Ok(());
        }
        log::info!("loading image {}", self.file.display());
        self.sprite = Some(self.load()?);
        Ok(())
    }

    fn render(&mut self, surface: &mut Surface) -> Result<(), DrawError> {
        let sprite = self
            .sprite
            .as_ref()
            .ok_or(DrawError::NotInitialised("Image"))?;
        let src = Rectangle::new(Point::zero(), Size::new(sprite.width(), sprite.height()));
        surface.blit(Point::new(self.x, self.y), sprite, src)
    }
}
