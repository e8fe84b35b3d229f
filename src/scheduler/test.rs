use super::{InitError, RenderError, ScheduleError, SchedulerConfig, Ui};
use crate::{
    backend::{BackendError, FrameProbe, MemoryBackend},
    config::DisplayConfig,
    screen::Screen,
    surface::{DrawError, Sprite, Surface},
    widget::{self, Animation, FrameClock, SharedWidget, TextBox, Widget, WidgetError},
};
use embedded_graphics::{prelude::Point, primitives::Rectangle};
use rand::Rng;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use test_case::test_case;

type Log = Arc<Mutex<Vec<(u64, Instant)>>>;

/// Records every render with its tag, and notices renders running concurrently.
struct Recorder {
    tag: u64,
    log: Log,
    busy: Arc<AtomicBool>,
    overlaps: Arc<AtomicUsize>,
    hold: Duration,
    animation: Option<Animation>,
}

impl Widget for Recorder {
    fn kind(&self) -> &'static str {
        "Recorder"
    }

    fn init(&mut self) -> Result<(), WidgetError> {
        Ok(())
    }

    fn render(&mut self, surface: &mut Surface) -> Result<(), DrawError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        if !self.hold.is_zero() {
            thread::sleep(self.hold);
        }
        if let Some(animation) = &mut self.animation {
            animation.render(surface)?;
        }
        self.log.lock().unwrap().push((self.tag, Instant::now()));
        self.busy.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn frame_clock(&self) -> Option<FrameClock> {
        self.animation.as_ref().and_then(|a| a.frame_clock())
    }
}

struct Harness {
    ui: Ui,
    render: Option<JoinHandle<Result<(), RenderError>>>,
    probe: FrameProbe,
    log: Log,
    busy: Arc<AtomicBool>,
    overlaps: Arc<AtomicUsize>,
}

impl Harness {
    fn new() -> Harness {
        let (backend, probe) = MemoryBackend::new();
        Harness::with_backend(backend, probe)
    }

    fn with_backend(backend: MemoryBackend, probe: FrameProbe) -> Harness {
        let display = DisplayConfig {
            width: 16,
            height: 16,
            bits_per_pixel: 16,
        };
        let config = SchedulerConfig {
            teardown_timeout: Some(Duration::from_secs(5)),
        };
        let (ui, render_loop) = Ui::init(backend, &display, config).unwrap();
        Harness {
            ui,
            render: Some(render_loop.spawn().unwrap()),
            probe,
            log: Log::default(),
            busy: Arc::default(),
            overlaps: Arc::default(),
        }
    }

    fn recorder(&self, tag: u64, hold: Duration, delays_ms: &[u64]) -> SharedWidget {
        let animation = (!delays_ms.is_empty()).then(|| {
            let frames = delays_ms
                .iter()
                .map(|&ms| (Sprite::new(2, 2), Duration::from_millis(ms)))
                .collect();
            Animation::from_frames(Point::zero(), frames).unwrap()
        });
        widget::shared(Recorder {
            tag,
            log: self.log.clone(),
            busy: self.busy.clone(),
            overlaps: self.overlaps.clone(),
            hold,
            animation,
        })
    }

    fn still(&self, tag: u64) -> SharedWidget {
        self.recorder(tag, Duration::ZERO, &[])
    }

    fn animated(&self, tag: u64, delays_ms: &[u64]) -> SharedWidget {
        self.recorder(tag, Duration::ZERO, delays_ms)
    }

    fn renders_of(&self, tag: u64) -> Vec<Instant> {
        let log = self.log.lock().unwrap();
        log.iter().filter(|(t, _)| *t == tag).map(|(_, at)| *at).collect()
    }

    fn tags(&self) -> Vec<u64> {
        self.log.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    /// Polls until `cond` holds, giving up after a generous deadline.
    fn wait_until(&self, cond: impl Fn(&Harness) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond(self) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond(self)
    }

    /// Waits for the render loop to return on its own.
    fn join(&mut self) -> Result<(), RenderError> {
        self.render.take().unwrap().join().unwrap()
    }

    fn finish(mut self) -> (Result<(), RenderError>, Harness) {
        self.ui.destroy();
        (self.join(), self)
    }
}

#[test]
fn test_show_renders_every_widget_once() {
    let mut h = Harness::new();
    let screen = Screen::new(vec![h.still(1), h.still(2)]);
    h.ui.show_screen(Arc::new(screen)).unwrap();
    assert_eq!(h.ui.generation(), 1);

    let (result, h) = h.finish();
    result.unwrap();
    assert_eq!(h.tags(), [1, 2]);
    assert_eq!(h.probe.presented(), 1);
    assert!(h.probe.released());
}

#[test]
fn test_ticks_follow_frame_delays() {
    let mut h = Harness::new();
    let screen = Screen::new(vec![h.still(1), h.animated(2, &[100, 200, 300])]);

    let start = Instant::now();
    h.ui.show_screen(Arc::new(screen)).unwrap();
    assert!(h.wait_until(|h| h.renders_of(2).len() >= 4));

    let (result, h) = h.finish();
    result.unwrap();

    assert_eq!(h.renders_of(1).len(), 1);
    let ticks: Vec<Duration> = h.renders_of(2).iter().map(|at| *at - start).collect();
    // One immediate render, then a job after 100, 200 and 300 more milliseconds
    for (tick, expected) in ticks[1..4].iter().zip([100, 300, 600]) {
        let expected = Duration::from_millis(expected);
        assert!(*tick >= expected, "ticks {ticks:?}");
        assert!(*tick < expected + Duration::from_millis(250), "ticks {ticks:?}");
    }
}

#[test]
fn test_switch_mid_wait_stops_animation() {
    let mut h = Harness::new();
    let screen = Screen::new(vec![h.still(1), h.animated(2, &[100, 200, 300])]);

    let start = Instant::now();
    h.ui.show_screen(Arc::new(screen)).unwrap();
    thread::sleep(Duration::from_millis(150).saturating_sub(start.elapsed()));

    // The task is waiting for its 200ms tick; the stop request must cut that wait short
    let switch = Instant::now();
    h.ui.show_screen(Arc::new(Screen::new(Vec::new()))).unwrap();
    assert!(switch.elapsed() < Duration::from_millis(100));

    thread::sleep(Duration::from_millis(50));
    let settled = h.renders_of(2).len();
    thread::sleep(Duration::from_millis(500));
    assert_eq!(h.renders_of(2).len(), settled);
    assert!((1..=2).contains(&settled), "{settled} renders");

    let (result, h) = h.finish();
    result.unwrap();
    assert_eq!(h.probe.presented(), settled + 1);
}

#[test]
fn test_stale_tasks_never_draw_after_next_screen() {
    let mut h = Harness::new();
    let mut rng = rand::thread_rng();

    for generation in 1..=15 {
        let screen = Screen::new(vec![
            h.animated(generation, &[20, 20]),
            h.still(generation),
            h.animated(generation, &[20, 30, 40]),
        ]);
        h.ui.show_screen(Arc::new(screen)).unwrap();
        thread::sleep(Duration::from_millis(rng.gen_range(0..60)));
    }

    let (result, h) = h.finish();
    result.unwrap();

    let tags = h.tags();
    assert!(
        tags.windows(2).all(|w| w[0] <= w[1]),
        "screens interleaved: {tags:?}"
    );
    for generation in 1..=15 {
        assert!(tags.contains(&generation));
    }
}

#[test]
fn test_switch_leaves_no_task_behind() {
    let mut h = Harness::new();
    let mut rng = rand::thread_rng();
    let widgets: Vec<SharedWidget> = (0..8).map(|tag| h.animated(tag, &[20, 25])).collect();

    for _ in 0..20 {
        h.ui.show_screen(Arc::new(Screen::new(widgets.clone()))).unwrap();
        thread::sleep(Duration::from_millis(rng.gen_range(0..40)));
        h.ui.show_screen(Arc::new(Screen::new(Vec::new()))).unwrap();

        // Task threads, their jobs and the shown screen each held a clone; all are gone
        for widget in &widgets {
            assert_eq!(Arc::strong_count(widget), 1);
        }
    }

    let (result, _) = h.finish();
    result.unwrap();
}

#[test]
fn test_jobs_never_overlap() {
    let mut h = Harness::new();
    let widgets = (0..4)
        .map(|tag| h.recorder(tag, Duration::from_millis(2), &[20, 25]))
        .collect();
    h.ui.show_screen(Arc::new(Screen::new(widgets))).unwrap();
    thread::sleep(Duration::from_millis(300));

    let (result, h) = h.finish();
    result.unwrap();
    assert_eq!(h.overlaps.load(Ordering::SeqCst), 0);
    assert!(h.tags().len() > 8, "only {} renders", h.tags().len());
}

#[test]
fn test_jobs_run_in_order_offered() {
    let mut h = Harness::new();
    for tag in 0..10 {
        let screen = Screen::new(vec![h.still(tag)]);
        h.ui.show_screen(Arc::new(screen)).unwrap();
    }

    let (result, h) = h.finish();
    result.unwrap();
    assert_eq!(h.tags(), (0..10).collect::<Vec<_>>());
    assert_eq!(h.probe.presented(), 10);
}

#[test]
fn test_producers_wait_for_render_thread() {
    let (backend, probe) = MemoryBackend::new();
    let mut h = Harness::with_backend(backend.with_present_delay(Duration::from_millis(50)), probe);

    let start = Instant::now();
    let mut returned = Vec::new();
    for tag in 0..3 {
        let screen = Screen::new(vec![h.still(tag)]);
        h.ui.show_screen(Arc::new(screen)).unwrap();
        returned.push(start.elapsed());
    }

    // Every hand-off after the first waits for the previous job's present
    assert!(returned[1] >= Duration::from_millis(50), "{returned:?}");
    assert!(returned[2] >= Duration::from_millis(100), "{returned:?}");

    let (result, _) = h.finish();
    result.unwrap();
}

#[test]
fn test_hook_runs_on_render_thread_before_widgets() {
    let mut h = Harness::new();
    let log = h.log.clone();
    let threads = Arc::new(Mutex::new(Vec::new()));
    let threads_clone = threads.clone();
    let screen = Arc::new(Screen::with_hook(vec![h.still(1)], move |_| {
        log.lock().unwrap().push((0, Instant::now()));
        let name = thread::current().name().map(str::to_string);
        threads_clone.lock().unwrap().push(name);
    }));

    h.ui.show_screen(screen.clone()).unwrap();
    h.ui.show_screen(screen).unwrap();

    let (result, h) = h.finish();
    result.unwrap();
    assert_eq!(h.tags(), [0, 1, 0, 1]);
    assert_eq!(
        *threads.lock().unwrap(),
        [Some("render".to_string()), Some("render".to_string())]
    );
}

#[test]
fn test_hook_mutation_is_drawn() {
    let mut h = Harness::new();
    let text = Arc::new(Mutex::new(TextBox::new(
        Rectangle::new(Point::zero(), embedded_graphics::prelude::Size::new(16, 10)),
        "mono",
        10,
        "",
    )));
    text.lock().unwrap().init().unwrap();
    let text_clone = text.clone();
    let shared: SharedWidget = text.clone();
    let counter = Arc::new(AtomicUsize::new(0));
    let screen = Arc::new(Screen::with_hook(vec![shared], move |_| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        text_clone.lock().unwrap().set_text(format!("{n}"));
    }));

    h.ui.show_screen(screen.clone()).unwrap();
    h.ui.show_screen(screen).unwrap();

    let (result, h) = h.finish();
    result.unwrap();
    assert_eq!(text.lock().unwrap().text, "1");
    assert_eq!(h.probe.presented(), 2);
}

#[test]
fn test_same_screen_shown_repeatedly() {
    let mut h = Harness::new();
    let screen = Arc::new(Screen::new(vec![h.animated(1, &[20, 20, 20])]));
    for _ in 0..5 {
        h.ui.show_screen(screen.clone()).unwrap();
        thread::sleep(Duration::from_millis(30));
    }

    let (result, h) = h.finish();
    result.unwrap();
    assert!(h.renders_of(1).len() >= 5);
    assert_eq!(h.ui.generation(), 5);
}

#[test]
fn test_destroy_is_idempotent() {
    let mut h = Harness::new();
    let screen = Screen::new(vec![h.animated(1, &[20, 20])]);
    h.ui.show_screen(Arc::new(screen)).unwrap();
    thread::sleep(Duration::from_millis(60));

    h.ui.destroy();
    h.ui.destroy();
    let (result, mut h) = h.finish();
    result.unwrap();
    assert!(h.probe.released());

    let rendered = h.tags().len();
    let presented = h.probe.presented();
    let screen = Screen::new(vec![h.still(2)]);
    h.ui.show_screen(Arc::new(screen)).unwrap();
    thread::sleep(Duration::from_millis(60));
    assert_eq!(h.tags().len(), rendered);
    assert_eq!(h.probe.presented(), presented);
}

#[test]
fn test_draw_failure_is_fatal() {
    let mut h = Harness::new();
    // Never initialised, so rendering fails
    let broken = widget::shared(TextBox::new(Rectangle::zero(), "mono", 10, "oops"));
    let screen = Screen::new(vec![h.still(1), broken]);
    h.ui.show_screen(Arc::new(screen)).unwrap();

    let result = h.join();
    assert!(matches!(
        result,
        Err(RenderError::Draw(DrawError::NotInitialised("TextBox")))
    ));
    assert_eq!(h.probe.presented(), 0);
    assert!(h.probe.released());

    let screen = Screen::new(vec![h.still(2)]);
    let err = h.ui.show_screen(Arc::new(screen)).unwrap_err();
    assert!(matches!(err, ScheduleError::RenderLoopGone));
    assert_eq!(h.tags(), [1]);
}

#[test]
fn test_present_failure_is_fatal() {
    let (backend, probe) = MemoryBackend::new();
    let mut h = Harness::with_backend(backend.failing_after(1), probe);
    let screen = Screen::new(vec![h.still(1)]);
    h.ui.show_screen(Arc::new(screen)).unwrap();
    let screen = Screen::new(vec![h.still(2)]);
    h.ui.show_screen(Arc::new(screen)).unwrap();

    let (result, h) = h.finish();
    assert!(matches!(
        result,
        Err(RenderError::Present(BackendError::Present(1)))
    ));
    assert_eq!(h.probe.presented(), 1);
    assert!(h.probe.released());
}

#[test]
fn test_render_loop_gone_stops_tasks() {
    let mut h = Harness::new();
    let broken = widget::shared(TextBox::new(Rectangle::zero(), "mono", 10, "oops"));
    let animated = h.animated(1, &[20, 20]);
    let screen = Screen::new(vec![animated, broken]);
    h.ui.show_screen(Arc::new(screen)).unwrap();

    assert!(h.join().is_err());

    // The seeds died with the failed job, so tearing down their handles must not block
    let start = Instant::now();
    let err = h
        .ui
        .show_screen(Arc::new(Screen::new(Vec::new())))
        .unwrap_err();
    assert!(matches!(err, ScheduleError::RenderLoopGone));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test_case(16, 16, 12 ; "unsupported depth")]
#[test_case(0, 16, 16 ; "empty surface")]
#[test_case(100_000, 100_000, 32 ; "oversized surface")]
fn test_init_errors(width: u32, height: u32, bits_per_pixel: u8) {
    let (backend, _) = MemoryBackend::new();
    let display = DisplayConfig {
        width,
        height,
        bits_per_pixel,
    };
    let err = Ui::init(backend, &display, SchedulerConfig::default()).unwrap_err();
    match err {
        InitError::UnsupportedDepth(bits) => assert_eq!(bits, bits_per_pixel),
        InitError::Backend(BackendError::Allocation { width: w, .. }) => assert_eq!(w, width),
        other => panic!("unexpected {other:?}"),
    }
}
