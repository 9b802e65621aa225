//! Cooperative event-loop bridge.
//!
//! GLib wants to own the thread it dispatches on; so does an async executor.
//! [`EventLoop`] lets them share one thread by polling the GLib main context
//! from inside a tokio task:
//!
//! 1. dispatch every pending GLib event without blocking;
//! 2. if anything was dispatched, yield to other tasks and poll again;
//! 3. otherwise sleep, starting at the poll interval and backing off
//!    geometrically while the context stays idle.
//!
//! Native callbacks therefore only run inside step 1, on the loop's thread.
//!
//! # Example
//!
//! ```ignore
//! use gobridge_core::{EventLoop, EventLoopConfig, NativeMainContext};
//!
//! let event_loop = EventLoop::new(
//!     Box::new(NativeMainContext::new(&runtime)),
//!     EventLoopConfig::default(),
//! );
//! event_loop.run_blocking(Some(app))?;
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use crate::config::EventLoopConfig;
use crate::error::{BridgeError, Result};
use crate::runtime::Runtime;
use crate::symbols::GBoolean;
use crate::sys::NativeHandle;

/// The pollable side of a GLib main context.
pub trait MainContext {
    /// Whether events are ready to dispatch.
    fn pending(&self) -> bool;

    /// Runs one iteration, dispatching ready events. Returns whether
    /// anything was dispatched.
    fn iteration(&self, may_block: bool) -> bool;
}

/// The process-default GLib main context.
pub struct NativeMainContext {
    runtime: Rc<Runtime>,
    context: NativeHandle,
}

impl NativeMainContext {
    pub fn new(runtime: &Rc<Runtime>) -> Self {
        Self {
            runtime: Rc::clone(runtime),
            context: runtime.main_context(),
        }
    }
}

impl MainContext for NativeMainContext {
    fn pending(&self) -> bool {
        // SAFETY: the default context lives for the whole process.
        unsafe { (self.runtime.glib().g_main_context_pending)(self.context.as_ptr()) }.is_true()
    }

    fn iteration(&self, may_block: bool) -> bool {
        // SAFETY: as above.
        unsafe {
            (self.runtime.glib().g_main_context_iteration)(self.context.as_ptr(), GBoolean::from(may_block))
        }
        .is_true()
    }
}

/// An application the loop registers, activates and quits.
pub trait LoopApplication {
    /// Registers with the session. Failing here keeps the loop from starting.
    fn register(&self) -> Result<()>;

    fn activate(&self);

    fn quit(&self);
}

/// Geometric idle backoff between a base delay and a ceiling.
#[derive(Debug, Clone)]
pub struct IdleBackoff {
    base: Duration,
    max: Duration,
    factor: u32,
    current: Option<Duration>,
}

impl IdleBackoff {
    pub fn new(config: &EventLoopConfig) -> Self {
        Self {
            base: config.poll_interval,
            max: config.effective_max(),
            factor: config.effective_factor(),
            current: None,
        }
    }

    /// The next delay: the base delay after a reset, otherwise the previous
    /// delay times the factor, capped at the ceiling.
    pub fn next(&mut self) -> Duration {
        let delay = match self.current {
            None => self.base,
            Some(previous) => previous
                .checked_mul(self.factor)
                .map_or(self.max, |delay| delay.min(self.max)),
        };
        self.current = Some(delay);
        delay
    }

    /// Starts over from the base delay.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// The delay last returned by [`next`](Self::next) since the last reset.
    pub fn current(&self) -> Option<Duration> {
        self.current
    }
}

/// Counters describing the loop's activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Number of times a poll loop was entered.
    pub loops_entered: u64,
    /// Number of poll iterations (drain + yield or sleep).
    pub iterations: u64,
    /// Number of native iterations run while draining.
    pub events_dispatched: u64,
    /// The most recent idle sleep.
    pub last_idle_delay: Option<Duration>,
}

/// Drives a [`MainContext`] from a tokio task.
pub struct EventLoop {
    context: Box<dyn MainContext>,
    config: EventLoopConfig,
    running: Cell<bool>,
    // Bumped by every `start`; a poll loop only runs while its own
    // generation is current.
    generation: Cell<u64>,
    app: RefCell<Option<Rc<dyn LoopApplication>>>,
    stats: Cell<LoopStats>,
}

impl EventLoop {
    pub fn new(context: Box<dyn MainContext>, config: EventLoopConfig) -> Self {
        Self {
            context,
            config,
            running: Cell::new(false),
            generation: Cell::new(0),
            app: RefCell::new(None),
            stats: Cell::new(LoopStats::default()),
        }
    }

    /// A loop over the process-default main context.
    pub fn native(runtime: &Rc<Runtime>, config: EventLoopConfig) -> Self {
        Self::new(Box::new(NativeMainContext::new(runtime)), config)
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// The base poll interval.
    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    pub fn config(&self) -> &EventLoopConfig {
        &self.config
    }

    pub fn stats(&self) -> LoopStats {
        self.stats.get()
    }

    fn update_stats(&self, f: impl FnOnce(&mut LoopStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.running.get() && self.generation.get() == generation
    }

    /// Runs the loop until [`stop`](Self::stop) is called.
    ///
    /// With an application, registers and activates it first; a
    /// registration failure is returned and the loop does not start. The
    /// loop counts as running during activation, so a `stop` from an
    /// `activate` handler ends it before the first poll. If the loop is
    /// already running this returns immediately.
    ///
    /// Starting again after `stop` supersedes a previous poll loop that has
    /// not woken up yet; that loop exits without polling again.
    pub async fn start(&self, app: Option<Rc<dyn LoopApplication>>) -> Result<()> {
        if self.running.get() {
            tracing::debug!(target: "gobridge_core::event_loop", "start ignored: already running");
            return Ok(());
        }
        if let Some(app) = &app {
            app.register()?;
        }
        let generation = self.generation.get().wrapping_add(1);
        self.generation.set(generation);
        *self.app.borrow_mut() = app.clone();
        self.running.set(true);
        self.update_stats(|stats| stats.loops_entered += 1);
        if let Some(app) = &app {
            app.activate();
        }
        tracing::info!(
            target: "gobridge_core::event_loop",
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            generation,
            "event loop started"
        );

        let mut backoff = IdleBackoff::new(&self.config);
        while self.is_current(generation) {
            let mut dispatched = 0u64;
            while self.context.pending() {
                self.context.iteration(false);
                dispatched += 1;
            }
            self.update_stats(|stats| {
                stats.iterations += 1;
                stats.events_dispatched += dispatched;
            });

            if dispatched > 0 {
                tracing::trace!(target: "gobridge_core::event_loop", dispatched, "drained main context");
                backoff.reset();
                tokio::task::yield_now().await;
            } else {
                let delay = backoff.next();
                self.update_stats(|stats| stats.last_idle_delay = Some(delay));
                tracing::trace!(target: "gobridge_core::event_loop", delay_ms = delay.as_millis() as u64, "idle");
                tokio::time::sleep(delay).await;
            }
        }

        if self.generation.get() == generation {
            self.app.borrow_mut().take();
            tracing::info!(target: "gobridge_core::event_loop", "event loop stopped");
        } else {
            tracing::debug!(target: "gobridge_core::event_loop", generation, "superseded poll loop exited");
        }
        Ok(())
    }

    /// Asks the loop to exit after its current iteration, quitting the
    /// application if there is one. Does nothing if the loop is not running.
    pub fn stop(&self) {
        if !self.running.get() {
            return;
        }
        let app = self.app.borrow().clone();
        if let Some(app) = app {
            app.quit();
        }
        self.running.set(false);
    }

    /// Runs [`start`](Self::start) to completion on a new current-thread
    /// tokio runtime.
    pub fn run_blocking(&self, app: Option<Rc<dyn LoopApplication>>) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|err| BridgeError::Runtime(err.to_string()))?;
        runtime.block_on(self.start(app))
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("config", &self.config)
            .field("running", &self.running.get())
            .field("generation", &self.generation.get())
            .field("stats", &self.stats.get())
            .finish()
    }
}
