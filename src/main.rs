use anyhow::{anyhow, Context};
use clap::Parser;
use crossterm::event::KeyCode;
use embedded_graphics::{
    prelude::{Point, Size},
    primitives::Rectangle,
};
use image::Rgba;
use log::{error, info, LevelFilter};
use log4rs::{
    append::file::FileAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
};
use panelkit::{
    backend::{Backend, MemoryBackend, TerminalBackend},
    color::Color,
    config::{Config, DisplayConfig},
    surface::Sprite,
    widget::{self, Animation, SharedWidget, TextBox},
    RenderLoop, Screen, SchedulerConfig, Ui,
};
use spin_sleep::LoopHelper;
use std::{
    f32::consts::TAU,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);
const QUIT_KEY: KeyCode = KeyCode::Char('q');

/// Cycles through screens of widgets, drawn on a single render thread
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON file describing the display and its screens. A built-in demo is shown without one
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Render into memory instead of the terminal
    #[arg(long)]
    headless: bool,

    /// How long each screen stays up, overriding the config file
    #[arg(short, long)]
    interval_ms: Option<u64>,

    /// Stop after this many screens were shown, 0 runs until `q` is pressed
    #[arg(short, long, default_value_t = 0)]
    switches: u64,

    #[arg(long, default_value = "panelkit.log")]
    log_file: PathBuf,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_file, args.log_level)?;

    let (display, screens, configured_interval) = match &args.config {
        Some(path) => {
            let config = Config::from_file(path)
                .with_context(|| format!("unable to load {}", path.display()))?;
            let interval = config.interval();
            (config.display.clone(), config.build_screens(), interval)
        }
        None => {
            let display = DisplayConfig::default();
            let screens = demo_screens(&display)?;
            (display, screens, None)
        }
    };
    if screens.is_empty() {
        return Err(anyhow!("nothing to show, the config has no screens"));
    }
    let interval = args
        .interval_ms
        .map(Duration::from_millis)
        .or(configured_interval)
        .unwrap_or(DEFAULT_INTERVAL);

    if args.headless {
        let (backend, probe) = MemoryBackend::new();
        run(backend, &display, &screens, interval, args.switches, false)?;
        info!("{} frames presented", probe.presented());
    } else {
        let backend = TerminalBackend::new("panelkit")?;
        run(backend, &display, &screens, interval, args.switches, true)?;
    }
    Ok(())
}

fn init_logging(path: &Path, level: LevelFilter) -> anyhow::Result<()> {
    // The terminal belongs to the display, so logs go to a file
    let file = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%H:%M:%S%.3f)} {l:<5} {t} - {m}{n}",
        )))
        .build(path)
        .with_context(|| format!("unable to open log file {}", path.display()))?;
    let config = log4rs::Config::builder()
        .appender(Appender::builder().build("file", Box::new(file)))
        .build(Root::builder().appender("file").build(level))
        .context("invalid logging config")?;
    log4rs::init_config(config).context("unable to initialise logging")?;
    Ok(())
}

fn run<B: Backend>(
    backend: B,
    display: &DisplayConfig,
    screens: &[Arc<Screen>],
    interval: Duration,
    switches: u64,
    interactive: bool,
) -> anyhow::Result<()> {
    let (mut ui, render_loop): (Ui, RenderLoop<B>) =
        Ui::init(backend, display, SchedulerConfig::default())
            .context("unable to initialise the display")?;
    let render = render_loop
        .spawn()
        .context("unable to spawn the render thread")?;

    let driven = drive(&mut ui, screens, interval, switches, interactive);

    ui.destroy();
    let rendered = render
        .join()
        .map_err(|_| anyhow!("render thread panicked"))?;
    // A render failure is what usually ends the driver early, so report it first
    rendered.context("render loop failed")?;
    driven
}

fn drive(
    ui: &mut Ui,
    screens: &[Arc<Screen>],
    interval: Duration,
    switches: u64,
    interactive: bool,
) -> anyhow::Result<()> {
    for (index, screen) in screens.iter().enumerate() {
        screen
            .init()
            .with_context(|| format!("screen #{index} could not be initialised"))?;
    }

    let mut lh = LoopHelper::builder().build_with_target_rate(1. / interval.as_secs_f32());
    for screen in screens.iter().cycle() {
        lh.loop_start();
        if let Err(err) = ui.show_screen(screen.clone()) {
            error!("unable to show the next screen: {err}");
            return Err(err.into());
        }
        if switches != 0 && ui.generation() >= switches {
            // Let the last screen stay up for its interval too
            lh.loop_sleep();
            break;
        }
        if interactive && TerminalBackend::poll_key(interval / 4)? == Some(QUIT_KEY) {
            info!("quit requested");
            break;
        }
        lh.loop_sleep();
    }
    Ok(())
}

/// A greeting that counts how often it was shown, with a spinner below it, followed by a
/// screen of plain text.
fn demo_screens(display: &DisplayConfig) -> anyhow::Result<Vec<Arc<Screen>>> {
    let width = display.width.saturating_sub(16);
    let mut greeting = TextBox::new(
        Rectangle::new(Point::new(8, 16), Size::new(width, 30)),
        "profont",
        24,
        "Hello",
    );
    greeting.center = true;
    let greeting = Arc::new(Mutex::new(greeting));

    let spinner_at = Point::new(display.width as i32 / 2 - 12, 64);
    let spinner = widget::shared(spinner(spinner_at, 24)?);

    let shows = AtomicU64::new(0);
    let hooked = greeting.clone();
    let greeting: SharedWidget = greeting;
    let hello = Screen::with_hook(vec![greeting, spinner], move |_| {
        let n = shows.fetch_add(1, Ordering::Relaxed) + 1;
        hooked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_text(format!("Hello {n}"));
    });

    let mut about = TextBox::new(
        Rectangle::new(Point::new(8, 8), Size::new(width, display.height.saturating_sub(16))),
        "mono",
        10,
        "panelkit demo\n\nEach screen is drawn on the render thread, the spinner by its own \
         animation task. Press q to quit.",
    );
    about.color = Color::new(0xff, 0xc0, 0x40);
    about.interval = 2;

    Ok(vec![
        Arc::new(hello),
        Arc::new(Screen::new(vec![widget::shared(about)])),
    ])
}

/// Eight frames of a dot running around a circle.
fn spinner(position: Point, size: u32) -> anyhow::Result<Animation> {
    const FRAMES: usize = 8;
    let center = size as f32 / 2.;
    let radius = center - 4.;
    let frames = (0..FRAMES)
        .map(|i| {
            let angle = TAU * i as f32 / FRAMES as f32;
            let (dx, dy) = (center + radius * angle.cos(), center + radius * angle.sin());
            let sprite = Sprite::from_fn(size, size, |x, y| {
                let (px, py) = (x as f32 + 0.5 - dx, y as f32 + 0.5 - dy);
                if px * px + py * py <= 9. {
                    Rgba([0x40, 0xc0, 0xff, 0xff])
                } else {
                    Rgba([0, 0, 0, 0xff])
                }
            });
            (sprite, Duration::from_millis(80))
        })
        .collect();
    Ok(Animation::from_frames(position, frames)?)
}
