//! Per-widget ticking tasks and the stop/acknowledge handshake that tears them down.
//!
//! Every animated widget on the shown screen gets a thread that sleeps for the current frame's
//! delay and then hands a "render this widget" job to the render loop. The thread never draws
//! anything itself.
//!
//! A task is split in two halves when its screen is scheduled: the [`TaskHandle`] stays with the
//! [`crate::Ui`] in its teardown registry, the [`TaskSeed`] travels inside the screen's show job
//! and is started on the render thread once the screen has been drawn. Stopping sends on a
//! single-slot stop channel, blocks until the task acknowledges and then joins its thread, so the
//! caller knows the task can no longer enqueue anything.

use crate::{
    scheduler::{Job, ScheduleError},
    widget::{self, FrameClock, SharedWidget},
};
use log::{debug, error, trace, warn};
use std::{
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError},
        Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// Filled by [`TaskSeed::start`], emptied by the join in [`TaskHandle::stop`].
type ThreadSlot = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Stopper side of an animation task.
#[derive(Debug)]
pub(crate) struct TaskHandle {
    id: u64,
    kind: &'static str,
    stop_tx: SyncSender<()>,
    ack_rx: Receiver<()>,
    thread: ThreadSlot,
}

/// Task side, waiting to be started.
pub(crate) struct TaskSeed {
    id: u64,
    widget: SharedWidget,
    stop_rx: Receiver<()>,
    ack_tx: SyncSender<()>,
    thread: ThreadSlot,
}

/// Creates both halves of a task for `widget`.
pub(crate) fn pair(id: u64, kind: &'static str, widget: SharedWidget) -> (TaskHandle, TaskSeed) {
    let (stop_tx, stop_rx) = mpsc::sync_channel(1);
    let (ack_tx, ack_rx) = mpsc::sync_channel(1);
    let thread = ThreadSlot::default();
    (
        TaskHandle {
            id,
            kind,
            stop_tx,
            ack_rx,
            thread: thread.clone(),
        },
        TaskSeed {
            id,
            widget,
            stop_rx,
            ack_tx,
            thread,
        },
    )
}

impl TaskHandle {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Requests the task to stop, waits for its acknowledgement and joins its thread. Waits
    /// forever unless `timeout` is given. A task that is already gone counts as stopped.
    pub(crate) fn stop(self, timeout: Option<Duration>) -> Result<(), ScheduleError> {
        match self.stop_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => self.await_ack(timeout)?,
            Err(TrySendError::Disconnected(())) => {
                trace!("animation task {} already gone", self.id);
            }
        }
        self.join()
    }

    fn await_ack(&self, timeout: Option<Duration>) -> Result<(), ScheduleError> {
        let acked = match timeout {
            None => self.ack_rx.recv().is_ok(),
            Some(timeout) => match self.ack_rx.recv_timeout(timeout) {
                Ok(()) => true,
                Err(RecvTimeoutError::Disconnected) => false,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(ScheduleError::TeardownTimedOut {
                        task: self.id,
                        kind: self.kind,
                        waited: timeout,
                    })
                }
            },
        };
        if acked {
            debug!("animation task {} acknowledged stop", self.id);
        } else {
            debug!("animation task {} exited without acknowledging", self.id);
        }
        Ok(())
    }

    /// Only called once the task has acknowledged or dropped its channels, so this never waits
    /// on a ticking thread.
    fn join(self) -> Result<(), ScheduleError> {
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // Never started
        let Some(thread) = thread else {
            return Ok(());
        };
        thread.join().map_err(|_| {
            error!("animation task {} panicked", self.id);
            ScheduleError::TaskPanicked {
                task: self.id,
                kind: self.kind,
            }
        })
    }
}

impl TaskSeed {
    /// Spawns the ticking thread. Must be called on the render thread, right after the widget
    /// has been drawn for the first time, so the clock starts from the frame now on screen.
    pub(crate) fn start(self, queue: SyncSender<Job>) {
        let clock = widget::lock(&self.widget).frame_clock();
        let Some(clock) = clock else {
            // Dropping the seed disconnects the handle, which then counts as stopped
            warn!("animation task {} has no frame clock, not starting", self.id);
            return;
        };

        let id = self.id;
        let slot = self.thread.clone();
        // Held across the spawn so a stopper woken by the ack always finds the handle
        let mut joinable = slot.lock().unwrap_or_else(PoisonError::into_inner);
        match thread::Builder::new()
            .name(format!("anim-{id}"))
            .spawn(move || self.run(queue, clock))
        {
            Ok(handle) => *joinable = Some(handle),
            Err(err) => warn!("unable to spawn animation task {id}: {err}"),
        }
    }

    fn run(self, queue: SyncSender<Job>, mut clock: FrameClock) {
        debug!("animation task {} ticking from frame {}", self.id, clock.shown());
        loop {
            match self.stop_rx.recv_timeout(clock.delay()) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            let widget = self.widget.clone();
            let job: Job = Box::new(move |surface| widget::lock(&widget).render(surface));
            if queue.send(job).is_err() {
                debug!("render loop gone, animation task {} exiting", self.id);
                return;
            }
            trace!("animation task {} queued frame {}", self.id, clock.shown());
            clock.advance();
        }

        // Nobody may be waiting if the stopper was dropped instead of asking
        let _ = self.ack_tx.try_send(());
        debug!("animation task {} stopped", self.id);
    }
}
