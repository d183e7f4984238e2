// ── Remote-control input arbitration ──
//
// Turns pointer and keyboard events on remote buttons into a rate-limited
// stream of `send(key)` calls. A press fires on pointer-up over the same
// button; the synthetic click that follows is suppressed. Presses closer
// together than the minimum interval are dropped, never queued.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use tracing::trace;

/// Default minimum spacing between two fires of the same key.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(15);

/// Clicks this soon after a pointer-up are the browser's echo of it.
const CLICK_SUPPRESS_WINDOW: Duration = Duration::from_millis(80);

/// The buttons on the TV remote panel. The string form is the IR code
/// sent to the hub.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RemoteKey {
    Power,
    Mute,
    Home,
    Up,
    Down,
    Left,
    Right,
    Ok,
    VolUp,
    VolDown,
    ChUp,
    ChDown,
    Menu,
    Back,
}

// ── Clock ────────────────────────────────────────────────────────────

/// Monotonic time source, as elapsed time since some fixed origin.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Wall-clock-independent clock backed by [`Instant`].
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

// ── Events in, side effects out ──────────────────────────────────────

/// The parts of a pointer event the arbiter looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerEvent {
    pub pointer_id: Option<i32>,
    /// `None` when the platform does not report a button.
    pub button: Option<i16>,
}

impl PointerEvent {
    pub fn primary(pointer_id: i32) -> Self {
        Self {
            pointer_id: Some(pointer_id),
            button: Some(0),
        }
    }
}

/// What the host should do with the event it just delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventResponse {
    pub stop_propagation: bool,
    pub prevent_default: bool,
    pub capture_pointer: Option<i32>,
    pub release_pointer: Option<i32>,
}

/// Where a fire attempt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    Pointer,
    Keyboard,
}

/// One fire attempt, accepted or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InputTelemetry {
    pub code: RemoteKey,
    pub source: InputSource,
    pub at: Duration,
    pub accepted: bool,
}

type SendFn = Box<dyn Fn(RemoteKey) + Send + Sync>;
type TelemetryFn = Box<dyn Fn(InputTelemetry) + Send + Sync>;

// ── Controller ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ArbiterState {
    /// `Some` while a press is held: the key and the pointer that armed it.
    armed: Option<(RemoteKey, Option<i32>)>,
    last_fired: HashMap<RemoteKey, Duration>,
    last_pointer_up: Option<Duration>,
}

struct Inner {
    send: SendFn,
    on_telemetry: Option<TelemetryFn>,
    clock: Arc<dyn Clock>,
    min_interval: Duration,
    state: Mutex<ArbiterState>,
}

/// Shared arbiter for every button on one remote panel.
///
/// Cheaply cloneable; all clones and all handler sets share one state.
#[derive(Clone)]
pub struct RemoteInputController {
    inner: Arc<Inner>,
}

impl RemoteInputController {
    pub fn new(send: impl Fn(RemoteKey) + Send + Sync + 'static) -> Self {
        Self::builder(send).build()
    }

    pub fn builder(send: impl Fn(RemoteKey) + Send + Sync + 'static) -> RemoteInputBuilder {
        RemoteInputBuilder {
            send: Box::new(send),
            on_telemetry: None,
            clock: None,
            min_interval: DEFAULT_MIN_INTERVAL,
        }
    }

    /// Handlers bound to one button.
    pub fn handlers_for(&self, code: RemoteKey) -> RemoteHandlers {
        RemoteHandlers {
            code,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for RemoteInputController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteInputController")
            .field("min_interval", &self.inner.min_interval)
            .finish_non_exhaustive()
    }
}

pub struct RemoteInputBuilder {
    send: SendFn,
    on_telemetry: Option<TelemetryFn>,
    clock: Option<Arc<dyn Clock>>,
    min_interval: Duration,
}

impl RemoteInputBuilder {
    #[must_use]
    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn on_telemetry(mut self, f: impl Fn(InputTelemetry) + Send + Sync + 'static) -> Self {
        self.on_telemetry = Some(Box::new(f));
        self
    }

    pub fn build(self) -> RemoteInputController {
        RemoteInputController {
            inner: Arc::new(Inner {
                send: self.send,
                on_telemetry: self.on_telemetry,
                clock: self
                    .clock
                    .unwrap_or_else(|| Arc::new(MonotonicClock::default())),
                min_interval: self.min_interval,
                state: Mutex::new(ArbiterState::default()),
            }),
        }
    }
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, ArbiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fire `code` unless it fired within the minimum interval.
    ///
    /// Callbacks run after the state lock is released.
    fn try_fire(&self, code: RemoteKey, source: InputSource) -> bool {
        let at = self.clock.now();
        let accepted = {
            let mut state = self.lock();
            let accepted = state
                .last_fired
                .get(&code)
                .is_none_or(|last| at.saturating_sub(*last) >= self.min_interval);
            if accepted {
                state.last_fired.insert(code, at);
            }
            accepted
        };

        trace!(%code, %source, accepted, "remote fire attempt");
        if accepted {
            (self.send)(code);
        }
        if let Some(observer) = &self.on_telemetry {
            observer(InputTelemetry {
                code,
                source,
                at,
                accepted,
            });
        }
        accepted
    }
}

/// Event handlers for one button, sharing the panel's arbiter.
#[derive(Clone)]
pub struct RemoteHandlers {
    code: RemoteKey,
    inner: Arc<Inner>,
}

impl RemoteHandlers {
    pub fn code(&self) -> RemoteKey {
        self.code
    }

    pub fn on_click(&self) -> EventResponse {
        let now = self.inner.clock.now();
        let echo = self
            .inner
            .lock()
            .last_pointer_up
            .is_some_and(|up| now.saturating_sub(up) < CLICK_SUPPRESS_WINDOW);
        if !echo {
            self.inner.try_fire(self.code, InputSource::Pointer);
        }
        EventResponse {
            stop_propagation: true,
            ..EventResponse::default()
        }
    }

    pub fn on_pointer_down(&self, event: &PointerEvent) -> EventResponse {
        if event.button.is_some_and(|b| b != 0) {
            return EventResponse::default();
        }
        self.inner.lock().armed = Some((self.code, event.pointer_id));
        EventResponse {
            stop_propagation: true,
            prevent_default: true,
            capture_pointer: event.pointer_id,
            release_pointer: None,
        }
    }

    pub fn on_pointer_up(&self) -> EventResponse {
        let armed = self.inner.lock().armed;
        if matches!(armed, Some((code, _)) if code == self.code) {
            self.inner.try_fire(self.code, InputSource::Pointer);
        }

        let now = self.inner.clock.now();
        let mut state = self.inner.lock();
        state.last_pointer_up = Some(now);
        state.armed = None;
        EventResponse {
            release_pointer: armed.and_then(|(_, pointer)| pointer),
            ..EventResponse::default()
        }
    }

    pub fn on_pointer_cancel(&self) -> EventResponse {
        self.inner.lock().armed = None;
        EventResponse::default()
    }

    pub fn on_pointer_leave(&self) -> EventResponse {
        self.inner.lock().armed = None;
        EventResponse::default()
    }

    /// Only Enter and Space activate a button.
    pub fn on_key_down(&self, key: &str) -> EventResponse {
        if key != "Enter" && key != " " {
            return EventResponse::default();
        }
        self.inner.try_fire(self.code, InputSource::Keyboard);
        EventResponse {
            stop_propagation: true,
            prevent_default: true,
            ..EventResponse::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[derive(Debug, Default)]
    struct ManualClock(AtomicU64);

    impl ManualClock {
        fn set_ms(&self, ms: u64) {
            self.0.store(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Duration {
            Duration::from_millis(self.0.load(Ordering::SeqCst))
        }
    }

    struct Rig {
        clock: Arc<ManualClock>,
        sent: Arc<Mutex<Vec<RemoteKey>>>,
        telemetry: Arc<Mutex<Vec<InputTelemetry>>>,
        ctrl: RemoteInputController,
    }

    impl Rig {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::default());
            let sent = Arc::new(Mutex::new(Vec::new()));
            let telemetry = Arc::new(Mutex::new(Vec::new()));

            let sink = Arc::clone(&sent);
            let tsink = Arc::clone(&telemetry);
            let ctrl = RemoteInputController::builder(move |k| sink.lock().unwrap().push(k))
                .clock(Arc::clone(&clock) as Arc<dyn Clock>)
                .on_telemetry(move |t| tsink.lock().unwrap().push(t))
                .build();

            Self {
                clock,
                sent,
                telemetry,
                ctrl,
            }
        }

        fn sent(&self) -> Vec<RemoteKey> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[test]
    fn keyboard_fires_immediately_and_throttles() {
        let rig = Rig::new();
        let h = rig.ctrl.handlers_for(RemoteKey::Power);

        h.on_key_down("Enter");
        assert_eq!(rig.sent(), vec![RemoteKey::Power]);

        rig.clock.set_ms(10);
        h.on_key_down("Enter");
        assert_eq!(rig.sent().len(), 1);

        rig.clock.set_ms(16);
        h.on_key_down("Enter");
        assert_eq!(rig.sent().len(), 2);
    }

    #[test]
    fn throttle_is_per_key() {
        let rig = Rig::new();
        rig.ctrl.handlers_for(RemoteKey::Up).on_key_down(" ");
        rig.ctrl.handlers_for(RemoteKey::Down).on_key_down(" ");
        assert_eq!(rig.sent(), vec![RemoteKey::Up, RemoteKey::Down]);
    }

    #[test]
    fn other_keys_are_ignored() {
        let rig = Rig::new();
        let resp = rig.ctrl.handlers_for(RemoteKey::Ok).on_key_down("a");
        assert_eq!(resp, EventResponse::default());
        assert!(rig.sent().is_empty());
        assert!(rig.telemetry.lock().unwrap().is_empty());
    }

    #[test]
    fn press_fires_on_release_and_suppresses_the_click_echo() {
        let rig = Rig::new();
        let h = rig.ctrl.handlers_for(RemoteKey::VolUp);
        let ev = PointerEvent::primary(7);

        let down = h.on_pointer_down(&ev);
        assert_eq!(down.capture_pointer, Some(7));
        assert!(down.prevent_default && down.stop_propagation);
        assert!(rig.sent().is_empty());

        rig.clock.set_ms(50);
        let up = h.on_pointer_up();
        assert_eq!(up.release_pointer, Some(7));
        assert_eq!(rig.sent(), vec![RemoteKey::VolUp]);

        rig.clock.set_ms(100);
        assert!(h.on_click().stop_propagation);
        assert_eq!(rig.sent().len(), 1);

        rig.clock.set_ms(200);
        h.on_click();
        assert_eq!(rig.sent().len(), 2);
    }

    #[test]
    fn release_over_another_button_does_not_fire() {
        let rig = Rig::new();
        let ev = PointerEvent::primary(1);
        rig.ctrl.handlers_for(RemoteKey::Left).on_pointer_down(&ev);
        rig.ctrl.handlers_for(RemoteKey::Right).on_pointer_up();
        assert!(rig.sent().is_empty());
    }

    #[test]
    fn secondary_button_is_ignored() {
        let rig = Rig::new();
        let h = rig.ctrl.handlers_for(RemoteKey::Home);
        let ev = PointerEvent {
            pointer_id: Some(1),
            button: Some(2),
        };
        assert_eq!(h.on_pointer_down(&ev), EventResponse::default());
        h.on_pointer_up();
        assert!(rig.sent().is_empty());
    }

    #[test]
    fn leave_and_cancel_disarm() {
        let rig = Rig::new();
        let h = rig.ctrl.handlers_for(RemoteKey::Mute);
        let ev = PointerEvent::primary(3);

        h.on_pointer_down(&ev);
        h.on_pointer_leave();
        h.on_pointer_up();

        h.on_pointer_down(&ev);
        h.on_pointer_cancel();
        h.on_pointer_up();

        assert!(rig.sent().is_empty());
    }

    #[test]
    fn telemetry_reports_every_attempt() {
        let rig = Rig::new();
        let h = rig.ctrl.handlers_for(RemoteKey::ChUp);
        h.on_key_down("Enter");
        rig.clock.set_ms(5);
        h.on_key_down("Enter");

        let t = rig.telemetry.lock().unwrap().clone();
        assert_eq!(t.len(), 2);
        assert!(t[0].accepted);
        assert!(!t[1].accepted);
        assert_eq!(t[1].source, InputSource::Keyboard);
        assert_eq!(t[1].at, Duration::from_millis(5));
    }

    #[test]
    fn key_codes_match_ir_names() {
        assert_eq!(RemoteKey::VolUp.to_string(), "vol_up");
        assert_eq!("ch_down".parse::<RemoteKey>().unwrap(), RemoteKey::ChDown);
    }
}
