//! Async driver for an [`Engine`]
//!
//! One tokio task owns the engine and multiplexes everything with
//! `tokio::select!`: host commands, completed fetches, and the three periodic
//! tasks (document refresh, clock polling, drift check). Nothing is shared
//! across threads; the host talks to the task through a command channel and
//! reads results from a `watch` channel.
//!
//! Timers only exist while the overlay is active. Stopping drops them along
//! with every in-flight fetch, so nothing fires or lands after a disable.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

use super::{Engine, OverlayFrame, Transition};
use crate::clock::ClockInput;
use crate::config::EngineConfig;
use crate::cue::AvailableRange;
use crate::fetch::{DocumentSource, FetchError};
use crate::position::{Orientation, Size};

/// Invoked whenever the available cue range changes.
pub type RangeCallback = Box<dyn Fn(Option<AvailableRange>) + Send + Sync>;

type FetchFuture = Pin<Box<dyn Future<Output = (u64, Result<String, FetchError>)> + Send>>;

enum Command {
    SetSource(Option<String>),
    SetEnabled(bool),
    SetClockInstant(f64),
    SetTimeOffset(f64),
    SetSizeScale(f64),
    SetChromeVisible(bool),
    SetVideoSize(Option<Size>),
    SetContainer(Size, Orientation),
    Refresh,
    OnRangeChange(RangeCallback),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running caption overlay.
///
/// Must be created inside a tokio runtime. Dropping the handle aborts the
/// overlay task.
pub struct Overlay {
    commands: mpsc::UnboundedSender<Command>,
    frames: watch::Receiver<OverlayFrame>,
    task: Option<JoinHandle<()>>,
}

impl Overlay {
    /// Start an inactive overlay. It becomes active once it has a source and
    /// is enabled.
    pub fn spawn(config: EngineConfig, source: Arc<dyn DocumentSource>, clock: ClockInput) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (frame_tx, frames) = watch::channel(OverlayFrame::default());

        let driver = Driver {
            engine: Engine::new(config),
            source,
            clock,
            frames: frame_tx,
            range_callbacks: Vec::new(),
            in_flight: FuturesUnordered::new(),
            fetch_timer: None,
            clock_timer: None,
            drift_timer: None,
            origin: Instant::now(),
        };
        let task = tokio::spawn(driver.run(command_rx));

        Self {
            commands,
            frames,
            task: Some(task),
        }
    }

    pub fn set_source(&self, url: Option<String>) {
        self.send(Command::SetSource(url));
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.send(Command::SetEnabled(enabled));
    }

    /// Push-form clock update. Ignored by the resolver until the overlay is
    /// active, but remembered.
    pub fn set_clock_instant(&self, instant: f64) {
        self.send(Command::SetClockInstant(instant));
    }

    pub fn set_time_offset(&self, offset: f64) {
        self.send(Command::SetTimeOffset(offset));
    }

    pub fn set_size_scale(&self, scale: f64) {
        self.send(Command::SetSizeScale(scale));
    }

    pub fn set_chrome_visible(&self, visible: bool) {
        self.send(Command::SetChromeVisible(visible));
    }

    pub fn set_video_size(&self, size: Option<Size>) {
        self.send(Command::SetVideoSize(size));
    }

    pub fn set_container(&self, container: Size, orientation: Orientation) {
        self.send(Command::SetContainer(container, orientation));
    }

    /// Fetch the document now, outside the regular period.
    pub fn refresh(&self) {
        self.send(Command::Refresh);
    }

    pub fn on_available_range_change(&self, callback: impl Fn(Option<AvailableRange>) + Send + Sync + 'static) {
        self.send(Command::OnRangeChange(Box::new(callback)));
    }

    /// Receiver for rendered frames. Only changed frames are published.
    #[must_use]
    pub fn frames(&self) -> watch::Receiver<OverlayFrame> {
        self.frames.clone()
    }

    #[must_use]
    pub fn current(&self) -> OverlayFrame {
        self.frames.borrow().clone()
    }

    /// Stop the overlay and wait for its task to finish.
    pub async fn shutdown(mut self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Command::Shutdown(done_tx));
        let _ = done_rx.await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Overlay task already finished, dropping command");
        }
    }
}

impl Drop for Overlay {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Driver {
    engine: Engine,
    source: Arc<dyn DocumentSource>,
    clock: ClockInput,
    frames: watch::Sender<OverlayFrame>,
    range_callbacks: Vec<RangeCallback>,
    in_flight: FuturesUnordered<FetchFuture>,
    // Periodic tasks; all `None` while inactive
    fetch_timer: Option<Interval>,
    clock_timer: Option<Interval>,
    drift_timer: Option<Interval>,
    /// Wall-clock zero for drift checks
    origin: Instant,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if !self.handle(command) {
                        break;
                    }
                }
                Some((epoch, result)) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    self.complete_fetch(epoch, result);
                }
                () = tick(self.fetch_timer.as_mut()) => self.start_fetch(),
                () = tick(self.clock_timer.as_mut()) => self.poll_clock(),
                () = tick(self.drift_timer.as_mut()) => self.check_drift(),
            }
            self.publish();
        }
        debug!("Overlay task finished");
    }

    /// Returns `false` once the overlay should shut down.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::SetSource(url) => {
                let transition = self.engine.set_source(url);
                self.apply(transition);
            }
            Command::SetEnabled(enabled) => {
                let transition = self.engine.set_enabled(enabled);
                self.apply(transition);
            }
            Command::SetClockInstant(instant) => self.engine.set_clock_instant(instant),
            Command::SetTimeOffset(offset) => self.engine.set_time_offset(offset),
            Command::SetSizeScale(scale) => self.engine.set_size_scale(scale),
            Command::SetChromeVisible(visible) => self.engine.set_chrome_visible(visible),
            Command::SetVideoSize(size) => self.engine.set_video_size(size),
            Command::SetContainer(container, orientation) => self.engine.set_container(container, orientation),
            Command::Refresh => self.start_fetch(),
            Command::OnRangeChange(callback) => self.range_callbacks.push(callback),
            Command::Shutdown(done) => {
                self.stop();
                let _ = done.send(());
                return false;
            }
        }
        true
    }

    fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::Started => {
                self.start_timers();
                self.start_fetch();
            }
            Transition::Restarted => {
                // Old responses are stale; the fetch period restarts from now
                self.in_flight = FuturesUnordered::new();
                if let Some(fetch) = self.fetch_timer.as_mut() {
                    fetch.reset();
                }
                self.start_fetch();
            }
            Transition::Stopped => self.stop(),
            Transition::Unchanged => {}
        }
    }

    fn start_timers(&mut self) {
        let config = self.engine.config();
        let now = Instant::now();

        let mut fetch = interval_at(now + config.fetch_period(), config.fetch_period());
        fetch.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Late drift ticks are the signal, so they must not be bunched up
        let mut drift = interval_at(now + config.drift_period(), config.drift_period());
        drift.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let clock = self.clock.is_pull().then(|| {
            let mut poll = interval(config.clock_poll_period());
            poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
            poll
        });

        self.fetch_timer = Some(fetch);
        self.drift_timer = Some(drift);
        self.clock_timer = clock;
    }

    fn stop(&mut self) {
        self.fetch_timer = None;
        self.clock_timer = None;
        self.drift_timer = None;
        self.in_flight = FuturesUnordered::new();
    }

    fn start_fetch(&mut self) {
        if !self.engine.is_active() {
            return;
        }
        let Some(url) = self.engine.source_url().map(str::to_owned) else {
            return;
        };
        let epoch = self.engine.fetch_epoch();
        let source = Arc::clone(&self.source);

        self.in_flight.push(Box::pin(async move {
            let result = source.fetch(&url).await;
            (epoch, result)
        }));
    }

    fn complete_fetch(&mut self, epoch: u64, result: Result<String, FetchError>) {
        match result {
            Ok(document) => {
                self.engine.offer_document(epoch, &document);
            }
            Err(err) => debug!(%err, "Caption document not ready"),
        }
    }

    fn poll_clock(&mut self) {
        if let ClockInput::Pull(clock) = &self.clock {
            let reading = clock.now();
            self.engine.poll_clock(reading);
        }
    }

    fn check_drift(&mut self) {
        let now = self.origin.elapsed().as_secs_f64();
        if let Some(outcome) = self.engine.check_drift(now) {
            if outcome.needs_correction() {
                self.start_fetch();
            }
        }
    }

    fn publish(&mut self) {
        self.engine.resolve();
        let frame = self.engine.frame();
        self.frames.send_if_modified(|current| {
            if *current == frame {
                false
            } else {
                *current = frame;
                true
            }
        });

        if let Some(range) = self.engine.take_range_change() {
            for callback in &self.range_callbacks {
                callback(range);
            }
        }
    }
}

async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
