use crate::{
    backend::{check_geometry, Backend, BackendError},
    surface::{PixelFormat, Surface},
};
use anyhow::Context;
use crossterm::{
    cursor::{Hide, Show},
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use ratatui::{
    backend::CrosstermBackend,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph},
    Frame, Terminal,
};
use std::{io::Stdout, time::Duration};

type CrossTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Presents the surface in the terminal. Every character cell shows two vertically stacked
/// pixels (`▀` with the top pixel as foreground and the bottom one as background); the surface
/// is scaled down to whatever the terminal offers.
pub struct TerminalBackend {
    terminal: Option<CrossTerminal>,
    title: String,
}

impl TerminalBackend {
    /// Waits up to `timeout` for a key press. Needs no backend instance, so the driver can poll
    /// while the render thread owns the terminal.
    pub fn poll_key(timeout: Duration) -> anyhow::Result<Option<KeyCode>> {
        if event::poll(timeout).context("event poll failed")? {
            return Ok(pressed_key(event::read().context("event read failed")?));
        }
        Ok(None)
    }

    pub fn new(title: impl Into<String>) -> anyhow::Result<TerminalBackend> {
        let mut stdout = std::io::stdout();
        enable_raw_mode().context("failed to enable raw mode")?;
        execute!(stdout, EnterAlternateScreen, Hide).context("unable to enter alternate screen")?;

        // Setup panic handler to cleanup terminal
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic| {
            let _ = Self::reset_terminal();
            original_hook(panic);
        }));

        let terminal =
            Terminal::new(CrosstermBackend::new(stdout)).context("creating terminal failed")?;

        Ok(TerminalBackend {
            terminal: Some(terminal),
            title: title.into(),
        })
    }

    fn draw(f: &mut Frame<'_>, title: &str, surface: &Surface) {
        let block = Block::default().title(title).borders(Borders::ALL);
        let inner = block.inner(f.size());
        let canvas = Paragraph::new(surface_to_text(surface, inner)).block(block);
        f.render_widget(canvas, f.size());
    }

    fn reset_terminal() -> std::io::Result<()> {
        disable_raw_mode()?;
        execute!(std::io::stdout(), LeaveAlternateScreen, Show)
    }
}

impl Backend for TerminalBackend {
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
        let terminal = self.terminal.as_mut().ok_or(BackendError::Released)?;
        let title = &self.title;
        terminal.draw(|frame| Self::draw(frame, title, surface))?;
        Ok(())
    }

    fn release(&mut self) {
        if let Some(mut terminal) = self.terminal.take() {
            if let Err(err) = terminal.show_cursor() {
                log::warn!("unable to show cursor: {err}");
            }
            if let Err(err) = Self::reset_terminal() {
                log::warn!("unable to switch to main screen: {err}");
            }
        }
    }
}

impl Drop for TerminalBackend {
    fn drop(&mut self) {
        self.release();
    }
}

/// Key releases and repeats are ignored.
fn pressed_key(event: Event) -> Option<KeyCode> {
    match event {
        Event::Key(KeyEvent {
            code,
            kind: KeyEventKind::Press,
            ..
        }) => Some(code),
        _ => None,
    }
}

fn to_tui_color(color: Rgb888) -> Color {
    Color::Rgb(color.r(), color.g(), color.b())
}

/// Nearest-neighbour downscale of the surface into `area`, two pixel rows per text row.
fn surface_to_text(surface: &Surface, area: Rect) -> Text<'static> {
    let cols = u32::from(area.width).min(surface.width());
    let rows = u32::from(area.height).min(surface.height().div_ceil(2));
    if cols == 0 || rows == 0 {
        return Text::default();
    }

    let sample = |cx: u32, py: u32| {
        let x = cx * surface.width() / cols;
        let y = py * surface.height() / (rows * 2);
        surface.pixel(x as i32, y as i32).unwrap_or(Rgb888::BLACK)
    };

    let lines: Vec<Line<'static>> = (0..rows)
        .map(|cy| {
            let spans: Vec<Span<'static>> = (0..cols)
                .map(|cx| {
                    let top = sample(cx, cy * 2);
                    let bottom = sample(cx, cy * 2 + 1);
                    Span::styled(
                        "▀",
                        Style::default()
                            .fg(to_tui_color(top))
                            .bg(to_tui_color(bottom)),
                    )
                })
                .collect();
            Line::from(spans)
        })
        .collect();
    Text::from(lines)
}
