use crate::{
    color::Color,
    surface::{DrawError, Surface},
    widget::{Widget, WidgetError},
};
use embedded_graphics::{
    mono_font::{ascii, MonoFont, MonoTextStyleBuilder},
    pixelcolor::Rgb888,
    prelude::*,
    primitives::Rectangle,
    text::{Baseline, Text},
};
use serde::Deserialize;

/// A box of word-wrapped text in a built-in monospace font.
///
/// Lines are wrapped on spaces to fit `w`, drawn on a `bg_color` background and spaced
/// `interval` pixels apart. Text is clipped horizontally to the box; lines starting more than `h`
/// below the top of the box are dropped.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TextBox {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
    pub color: Color,
    pub bg_color: Color,
    pub font_name: String,
    pub font_size: u32,
    pub interval: i32,
    pub center: bool,
    pub text: String,

    #[serde(skip)]
    font: Option<&'static MonoFont<'static>>,
}

/// Looks up one of the built-in fonts. `profont` comes in the ProFont point sizes, `mono` in the
/// embedded-graphics ascii fonts addressed by their pixel height.
pub fn resolve_font(name: &str, size: u32) -> Option<&'static MonoFont<'static>> {
    let font = match (name.to_ascii_lowercase().as_str(), size) {
        ("profont", 7) => &profont::PROFONT_7_POINT,
        ("profont", 9) => &profont::PROFONT_9_POINT,
        ("profont", 10) => &profont::PROFONT_10_POINT,
        ("profont", 12) => &profont::PROFONT_12_POINT,
        ("profont", 14) => &profont::PROFONT_14_POINT,
        ("profont", 18) => &profont::PROFONT_18_POINT,
        ("profont", 24) => &profont::PROFONT_24_POINT,
        ("mono", 6) => &ascii::FONT_4X6,
        ("mono", 7) => &ascii::FONT_5X7,
        ("mono", 8) => &ascii::FONT_5X8,
        ("mono", 9) => &ascii::FONT_6X9,
        ("mono", 10) => &ascii::FONT_6X10,
        ("mono", 12) => &ascii::FONT_6X12,
        ("mono", 13) => &ascii::FONT_6X13,
        ("mono", 14) => &ascii::FONT_7X14,
        ("mono", 15) => &ascii::FONT_9X15,
        ("mono", 18) => &ascii::FONT_9X18,
        ("mono", 20) => &ascii::FONT_10X20,
        _ => return None,
    };
    Some(font)
}

/// Splits `text` into lines on spaces and newlines. A word is appended to the current line while
/// `fits` accepts the result; a word that fits nowhere gets a line of its own.
pub(crate) fn word_wrap(text: &str, fits: impl Fn(&str) -> bool) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        for (i, word) in paragraph.split(' ').enumerate() {
            if i == 0 {
                line.push_str(word);
                continue;
            }
            let candidate = format!("{line} {word}");
            if fits(&candidate) {
                line = candidate;
            } else {
                lines.push(std::mem::replace(&mut line, word.to_string()));
            }
        }
        lines.push(line);
    }
    lines
}

fn text_width(font: &MonoFont<'_>, text: &str) -> u32 {
    let chars = text.chars().count() as u32;
    chars * (font.character_size.width + font.character_spacing)
}

impl TextBox {
    pub fn new(area: Rectangle, font_name: &str, font_size: u32, text: impl Into<String>) -> TextBox {
        TextBox {
            x: area.top_left.x,
            y: area.top_left.y,
            w: area.size.width,
            h: area.size.height,
            color: Color::WHITE,
            bg_color: Color::BLACK,
            font_name: font_name.to_string(),
            font_size,
            text: text.into(),
            ..TextBox::default()
        }
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }
}

impl Widget for TextBox {
    fn kind(&self) -> &'static str {
        "TextBox"
    }

    fn init(&mut self) -> Result<(), WidgetError> {
        log::info!("loading font {}, size={}", self.font_name, self.font_size);
        let font =
            resolve_font(&self.font_name, self.font_size).ok_or_else(|| WidgetError::UnknownFont {
                name: self.font_name.clone(),
                size: self.font_size,
            })?;
        self.font = Some(font);
        Ok(())
    }

    fn render(&mut self, surface: &mut Surface) -> Result<(), DrawError> {
        let font = self.font.ok_or(DrawError::NotInitialised("TextBox"))?;
        let style = MonoTextStyleBuilder::new()
            .font(font)
            .text_color(Rgb888::from(self.color))
            .background_color(Rgb888::from(self.bg_color))
            .build();
        let line_height = font.character_size.height;

        let mut y = self.y;
        for line in word_wrap(&self.text, |s| text_width(font, s) <= self.w) {
            if y - self.y > self.h as i32 {
                break;
            }
            let x = if self.center {
                self.x + (self.w as i32 - text_width(font, &line) as i32) / 2
            } else {
                self.x
            };
            let clip = Rectangle::new(Point::new(self.x, y), Size::new(self.w, line_height));
            Text::with_baseline(&line, Point::new(x, y), style, Baseline::Top)
                .draw(&mut surface.clipped(&clip))
                .ok();
            y += line_height as i32 + self.interval;
        }
        Ok(())
    }
}
