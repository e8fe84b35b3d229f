use crate::{
    screen::Screen,
    widget::{self, AnyWidget},
};
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

/// Geometry of the surface the backend allocates.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u8,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            width: 320,
            height: 240,
            bits_per_pixel: 16,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub widgets: Vec<AnyWidget>,
}

/// A whole display setup as read from a JSON file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub display: DisplayConfig,
    /// How long each screen stays up before the next one is shown
    pub interval_ms: Option<u64>,
    pub screens: Vec<ScreenConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not read the config file: {0}")]
    CouldNotRead(#[source] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[source] serde_json::Error),
}

impl Config {
    pub fn from_str(data: &str) -> Result<Config, Error> {
        serde_json::from_str(data).map_err(Error::Parse)
    }

    /// Reads a config file. Relative asset paths are taken relative to the file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(Error::CouldNotRead)?;
        let mut config = Self::from_str(&data)?;
        if let Some(base) = path.parent() {
            config.rebase_assets(base);
        }
        Ok(config)
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval_ms.map(Duration::from_millis)
    }

    fn rebase_assets(&mut self, base: &Path) {
        let rebase = |file: &mut PathBuf| {
            if file.is_relative() && !file.as_os_str().is_empty() {
                *file = base.join(&*file);
            }
        };
        for screen in &mut self.screens {
            for widget in &mut screen.widgets {
                match widget {
                    AnyWidget::Image(image) => rebase(&mut image.file),
                    AnyWidget::Animation(animation) => rebase(&mut animation.file),
                    AnyWidget::TextBox(_) => {}
                }
            }
        }
    }

    /// Turns every screen description into a [`Screen`]. Nothing is initialised yet.
    pub fn build_screens(self) -> Vec<Arc<Screen>> {
        self.screens
            .into_iter()
            .map(|screen| {
                let widgets = screen.widgets.into_iter().map(widget::shared).collect();
                Arc::new(Screen::new(widgets))
            })
            .collect()
    }
}
