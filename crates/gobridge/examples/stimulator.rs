//! Stimulator: keeps the computer awake while its switches are on.
//!
//! Two switches inhibit automatic suspend and screen blanking through the
//! session. Disabling suspend inhibition also disables idle inhibition. An
//! optional countdown (in minutes) switches inhibition off again.
//!
//! Run with: cargo run -p gobridge --example stimulator [-- <minutes>]

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use gobridge::prelude::*;
use tracing_subscriber::EnvFilter;

const APP_ID: &str = "io.github.gobridge.Stimulator";
const APP_NAME: &str = "Stimulator";
const COUNTDOWN_TICK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Suspend,
    Idle,
}

impl Kind {
    fn flags(self) -> InhibitFlags {
        match self {
            Kind::Suspend => InhibitFlags::SUSPEND,
            Kind::Idle => InhibitFlags::IDLE,
        }
    }

    fn reason(self) -> &'static str {
        match self {
            Kind::Suspend => "Stimulator is preventing the system from suspending",
            Kind::Idle => "Stimulator is preventing the screen from blanking",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Kind::Suspend => "Disable Automatic Suspending",
            Kind::Idle => "Disable Screen Blanking and Locking",
        }
    }
}

/// One switch with its status line and inhibition state.
struct Row {
    switch: Switch,
    status: Label,
    cookie: Cell<u32>,
    timer: Cell<Option<SourceId>>,
    remaining: Cell<u32>,
}

impl Row {
    fn new(toolkit: &Rc<Toolkit>, container: &BoxLayout, kind: Kind) -> Result<Self> {
        let title = Label::new(toolkit, kind.title())?;
        let switch = Switch::new(toolkit)?;
        let status = Label::new(toolkit, "Current state: System default")?;
        container.append(&title)?;
        container.append(&switch)?;
        container.append(&status)?;
        Ok(Self {
            switch,
            status,
            cookie: Cell::new(0),
            timer: Cell::new(None),
            remaining: Cell::new(0),
        })
    }
}

struct Stimulator {
    app: Rc<Application>,
    window: Window,
    suspend: Row,
    idle: Row,
    minutes: Option<u32>,
}

impl Stimulator {
    fn build(app: Rc<Application>, event_loop: Rc<EventLoop>, minutes: Option<u32>) -> Result<Rc<Self>> {
        let toolkit = Rc::clone(app.toolkit());
        let window = app.new_window()?;
        window.set_title(APP_NAME)?;
        window.set_default_size(420, 240)?;

        let rows = BoxLayout::new(&toolkit, Orientation::Vertical, 12)?;
        let suspend = Row::new(&toolkit, &rows, Kind::Suspend)?;
        let idle = Row::new(&toolkit, &rows, Kind::Idle)?;
        Widget::from(idle.switch.clone()).set_sensitive(false)?;
        window.set_child(Some(&rows))?;

        let stimulator = Rc::new(Self {
            app,
            window,
            suspend,
            idle,
            minutes,
        });

        for kind in [Kind::Suspend, Kind::Idle] {
            let weak = Rc::downgrade(&stimulator);
            stimulator.row(kind).switch.on_active_notify(move |active| {
                if let Some(stimulator) = weak.upgrade() {
                    stimulator.toggle(kind, active);
                }
            })?;
        }

        let weak = Rc::downgrade(&stimulator);
        stimulator.window.on_close_request(move || {
            if let Some(stimulator) = weak.upgrade() {
                stimulator.release();
            }
            event_loop.stop();
            false
        })?;

        stimulator.window.present()?;
        tracing::info!(countdown_minutes = ?minutes, "window ready");
        Ok(stimulator)
    }

    fn row(&self, kind: Kind) -> &Row {
        match kind {
            Kind::Suspend => &self.suspend,
            Kind::Idle => &self.idle,
        }
    }

    fn toggle(self: &Rc<Self>, kind: Kind, active: bool) {
        tracing::debug!(?kind, active, "toggled");
        if kind == Kind::Suspend {
            if let Err(err) = Widget::from(self.idle.switch.clone()).set_sensitive(active) {
                tracing::warn!(error = %err, "cannot update idle switch");
            }
            if !active && self.idle.switch.is_active().unwrap_or(false) {
                // Switching idle off re-enters `toggle` for the idle row.
                if let Err(err) = self.idle.switch.set_active(false) {
                    tracing::warn!(error = %err, "cannot switch idle inhibition off");
                }
            }
        }

        let result = if active {
            self.inhibit(kind)
        } else {
            self.uninhibit(kind)
        };
        if let Err(err) = result {
            tracing::error!(?kind, error = %err, "inhibition change failed");
        }
    }

    fn inhibit(self: &Rc<Self>, kind: Kind) -> Result<()> {
        let row = self.row(kind);
        if row.cookie.get() != 0 {
            return Ok(());
        }
        let cookie = self.app.inhibit(Some(&self.window), kind.flags(), kind.reason())?;
        row.cookie.set(cookie);
        if cookie == 0 {
            row.status.set_text("Current state: Refused by the session")?;
            return Ok(());
        }
        match self.minutes {
            Some(minutes) => {
                row.remaining.set(minutes);
                row.status.set_text(&countdown_text(minutes))?;
                row.timer.set(Some(self.start_countdown(kind)));
            }
            None => row.status.set_text("Current state: Active")?,
        }
        Ok(())
    }

    fn uninhibit(&self, kind: Kind) -> Result<()> {
        let row = self.row(kind);
        if let Some(timer) = row.timer.take() {
            timer.remove(self.app.toolkit().runtime());
        }
        self.app.uninhibit(row.cookie.replace(0))?;
        row.status.set_text("Current state: System default")?;
        Ok(())
    }

    fn start_countdown(self: &Rc<Self>, kind: Kind) -> SourceId {
        let weak: Weak<Self> = Rc::downgrade(self);
        timeout_add(self.app.toolkit().runtime(), COUNTDOWN_TICK, move || {
            let Some(stimulator) = weak.upgrade() else {
                return SourceControl::Break;
            };
            let row = stimulator.row(kind);
            let remaining = row.remaining.get().saturating_sub(1);
            row.remaining.set(remaining);
            if remaining > 0 {
                if let Err(err) = row.status.set_text(&countdown_text(remaining)) {
                    tracing::warn!(error = %err, "cannot update countdown");
                }
                return SourceControl::Continue;
            }
            // This source ends by returning `Break`; forget its id first so
            // switching off does not remove it a second time.
            row.timer.take();
            if let Err(err) = row.switch.set_active(false) {
                tracing::warn!(error = %err, "cannot end countdown");
            }
            SourceControl::Break
        })
    }

    /// Lifts every inhibition and stops every countdown.
    fn release(&self) {
        for kind in [Kind::Idle, Kind::Suspend] {
            if let Err(err) = self.uninhibit(kind) {
                tracing::warn!(?kind, error = %err, "cannot release inhibition");
            }
        }
    }
}

fn countdown_text(minutes: u32) -> String {
    format!("Current state: Active, {minutes} min left")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let minutes = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse::<u32>().ok())
        .filter(|minutes| *minutes > 0);

    let config = BridgeConfig::from_env();
    let toolkit = Toolkit::load(&config)?;
    toolkit.init();

    let app = Rc::new(Application::new(&toolkit, APP_ID, ApplicationFlags::DEFAULT)?);
    let event_loop = Rc::new(toolkit.event_loop(config.event_loop.clone()));
    let ui: Rc<RefCell<Option<Rc<Stimulator>>>> = Rc::default();

    {
        let weak_app = Rc::downgrade(&app);
        let event_loop = Rc::clone(&event_loop);
        let ui = Rc::clone(&ui);
        app.on_activate(move || {
            if let Some(existing) = ui.borrow().as_ref() {
                if let Err(err) = existing.window.present() {
                    tracing::warn!(error = %err, "cannot present window");
                }
                return;
            }
            let Some(app) = weak_app.upgrade() else {
                return;
            };
            match Stimulator::build(app, Rc::clone(&event_loop), minutes) {
                Ok(stimulator) => *ui.borrow_mut() = Some(stimulator),
                Err(err) => {
                    tracing::error!(error = %err, "cannot build the window");
                    event_loop.stop();
                }
            }
        })?;
    }

    {
        let event_loop = Rc::clone(&event_loop);
        let ui = Rc::clone(&ui);
        app.add_action("quit", move || {
            if let Some(stimulator) = ui.borrow().as_ref() {
                stimulator.release();
            }
            event_loop.stop();
        })?;
    }
    app.set_accels_for_action("app.quit", &["<Ctrl>q"])?;

    event_loop.run_blocking(Some(app.clone()))?;

    if let Some(stimulator) = ui.borrow_mut().take() {
        stimulator.release();
    }
    Ok(())
}
