// ── Control session actor ──
//
// Owns one `OptimisticControl` for one device attribute. Gestures arrive
// over an mpsc channel, hub updates over the store's device stream, and
// timers are the machine's own deadline. Everything touching the machine
// runs on this one task, so a new gesture cancels pending timers before
// any of them can fire.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::attribute::ControlledAttribute;
use super::machine::{Effect, OptimisticControl, Phase};
use crate::command::{Command, CommandSink};
use crate::config::ControlTiming;
use crate::error::CoreError;
use crate::model::{Device, DeviceId};
use crate::stream::DeviceStream;

const GESTURE_CHANNEL_SIZE: usize = 32;

/// User input for a control.
#[derive(Debug, Clone, PartialEq)]
pub enum Gesture<V> {
    /// Pointer down on a slider.
    Start,
    /// Slider moved.
    Update(V),
    /// Gesture abandoned without a value.
    Cancel,
    /// Slider released, or any explicit set.
    Commit(V),
    /// Pick a value from a list; commits only if it differs.
    Select(V),
    /// Power / open-close button.
    Toggle,
    /// `+` / `-` button.
    Step(f64),
}

/// How the latest commit ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<V> {
    Confirmed(V),
    RolledBack(V),
}

/// What a UI bound to this control should render.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlView<V> {
    pub phase: Phase,
    pub displayed: V,
    pub authoritative: V,
    /// Generation of the most recent commit.
    pub generation: u64,
    /// Resolution of commit `generation`; `None` while it is in flight.
    pub outcome: Option<Outcome<V>>,
}

struct GestureEnvelope<V> {
    gesture: Gesture<V>,
    /// Answers with the generation of the commit the gesture started.
    ack: Option<oneshot::Sender<Option<u64>>>,
}

// ── Handle ───────────────────────────────────────────────────────────

/// Client side of a running [`ControlSession`].
pub struct ControlHandle<A: ControlledAttribute> {
    gestures: mpsc::Sender<GestureEnvelope<A::Value>>,
    view: watch::Receiver<ControlView<A::Value>>,
    task: JoinHandle<()>,
}

impl<A: ControlledAttribute> ControlHandle<A> {
    /// Fire-and-forget a gesture.
    pub async fn send(&self, gesture: Gesture<A::Value>) -> Result<(), CoreError> {
        self.gestures
            .send(GestureEnvelope { gesture, ack: None })
            .await
            .map_err(|_| CoreError::ControllerDisconnected)
    }

    /// Send a gesture and wait until the commit it started is confirmed
    /// or rolled back.
    ///
    /// `Ok(None)` when the gesture started no commit, or when a later
    /// commit superseded it.
    pub async fn perform(
        &mut self,
        gesture: Gesture<A::Value>,
    ) -> Result<Option<Outcome<A::Value>>, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.gestures
            .send(GestureEnvelope {
                gesture,
                ack: Some(tx),
            })
            .await
            .map_err(|_| CoreError::ControllerDisconnected)?;

        let Some(generation) = rx.await.map_err(|_| CoreError::ControllerDisconnected)? else {
            return Ok(None);
        };

        loop {
            {
                let view = self.view.borrow_and_update();
                if view.generation > generation {
                    return Ok(None);
                }
                if view.generation == generation {
                    if let Some(outcome) = &view.outcome {
                        return Ok(Some(outcome.clone()));
                    }
                }
            }
            self.view
                .changed()
                .await
                .map_err(|_| CoreError::ControllerDisconnected)?;
        }
    }

    /// The current view.
    pub fn view(&self) -> ControlView<A::Value> {
        self.view.borrow().clone()
    }

    /// Watch the view for changes.
    pub fn subscribe(&self) -> watch::Receiver<ControlView<A::Value>> {
        self.view.clone()
    }

    /// Stop accepting gestures and wait for the session to exit.
    ///
    /// A commit still in flight is abandoned.
    pub async fn close(self) {
        drop(self.gestures);
        let _ = self.task.await;
    }
}

// ── Session ──────────────────────────────────────────────────────────

/// The actor driving one control.
pub struct ControlSession<A: ControlledAttribute> {
    id: DeviceId,
    machine: OptimisticControl<A>,
    device: Arc<Device>,
    sink: Arc<dyn CommandSink>,
    outcome: Option<Outcome<A::Value>>,
    view: watch::Sender<ControlView<A::Value>>,
}

impl<A: ControlledAttribute> ControlSession<A> {
    /// Start a session for `id`, seeded from the stream's current snapshot.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        id: DeviceId,
        devices: DeviceStream,
        sink: Arc<dyn CommandSink>,
        timing: ControlTiming,
        cancel: CancellationToken,
    ) -> Result<ControlHandle<A>, CoreError> {
        let device = devices
            .device(id)
            .ok_or(CoreError::DeviceNotFound { id })?;
        let machine = OptimisticControl::<A>::for_device(&device, timing);

        let (view_tx, view_rx) = watch::channel(ControlView {
            phase: machine.phase(),
            displayed: machine.displayed().clone(),
            authoritative: machine.authoritative().clone(),
            generation: machine.generation(),
            outcome: None,
        });
        let (gesture_tx, gesture_rx) = mpsc::channel(GESTURE_CHANNEL_SIZE);

        let session = Self {
            id,
            machine,
            device,
            sink,
            outcome: None,
            view: view_tx,
        };
        debug!(device = %id, attribute = A::NAME, "control session started");
        let task = tokio::spawn(session.run(gesture_rx, devices, cancel));

        Ok(ControlHandle {
            gestures: gesture_tx,
            view: view_rx,
            task,
        })
    }

    async fn run(
        mut self,
        mut gestures: mpsc::Receiver<GestureEnvelope<A::Value>>,
        mut devices: DeviceStream,
        cancel: CancellationToken,
    ) {
        loop {
            let deadline = self.machine.next_deadline();

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                envelope = gestures.recv() => {
                    let Some(envelope) = envelope else { break };
                    let started = self.on_gesture(envelope.gesture);
                    if let Some(ack) = envelope.ack {
                        let _ = ack.send(started);
                    }
                }
                snapshot = devices.changed() => {
                    let Some(snapshot) = snapshot else { break };
                    if let Some(device) = snapshot.iter().find(|d| d.id == self.id) {
                        self.on_device(Arc::clone(device));
                    }
                }
                () = wait_for(deadline) => self.on_timers(),
            }

            self.publish();
        }
        debug!(device = %self.id, attribute = A::NAME, "control session stopped");
    }

    /// Returns the generation of the commit this gesture started, if any.
    fn on_gesture(&mut self, gesture: Gesture<A::Value>) -> Option<u64> {
        let now = Instant::now();
        let effect = match gesture {
            Gesture::Start => {
                self.machine.on_interaction_start();
                None
            }
            Gesture::Update(value) => {
                self.machine.on_interaction_update(value);
                None
            }
            Gesture::Cancel => {
                self.machine.on_interaction_cancel();
                None
            }
            Gesture::Commit(value) => Some(self.machine.commit(value, now)),
            Gesture::Select(value) => self.machine.select(value, now),
            Gesture::Step(delta) => self.machine.step(delta, &self.device, now),
            Gesture::Toggle => {
                let effect = self.machine.toggle(&self.device, now);
                if effect.is_none() {
                    self.sink.dispatch(Command::SetPower {
                        id: self.id,
                        on: !self.device.is_on,
                    });
                }
                effect
            }
        };

        let effect = effect?;
        self.outcome = None;
        self.apply(effect);
        Some(self.machine.generation())
    }

    fn on_device(&mut self, device: Arc<Device>) {
        if Arc::ptr_eq(&device, &self.device) {
            return;
        }
        let value = A::read(&device);
        self.device = device;
        if let Some(effect) = self.machine.reconcile(value) {
            self.apply(effect);
        }
    }

    fn on_timers(&mut self) {
        let now = Instant::now();
        while let Some(effect) = self.machine.poll_timers(now) {
            self.apply(effect);
        }
    }

    fn apply(&mut self, effect: Effect<A::Value>) {
        match effect {
            Effect::Dispatch(value) => self.sink.dispatch(A::command(self.id, value)),
            Effect::Confirmed(value) => self.outcome = Some(Outcome::Confirmed(value)),
            Effect::RolledBack(value) => {
                warn!(
                    device = %self.id,
                    attribute = A::NAME,
                    value = ?value,
                    "hub never confirmed the change, reverted"
                );
                self.outcome = Some(Outcome::RolledBack(value));
            }
        }
    }

    fn publish(&self) {
        let next = ControlView {
            phase: self.machine.phase(),
            displayed: self.machine.displayed().clone(),
            authoritative: self.machine.authoritative().clone(),
            generation: self.machine.generation(),
            outcome: self.outcome.clone(),
        };
        self.view.send_if_modified(|view| {
            if *view == next {
                false
            } else {
                *view = next;
                true
            }
        });
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::control::attribute::{
        ClimateMode, ClimateTemperature, CurtainPosition, LightBrightness,
    };
    use crate::model::{DeviceMapping, EntityId, EntitySnapshot, EntityState};
    use crate::store::DataStore;

    const CURTAIN: DeviceId = DeviceId(3);
    const LIGHT: DeviceId = DeviceId(1);
    const AC: DeviceId = DeviceId(4);

    fn store() -> Arc<DataStore> {
        let curtain = Device {
            position: Some(50),
            is_on: true,
            ..Device::new(CURTAIN, "curtain")
        };
        let light = Device::new(LIGHT, "light");
        let ac = Device {
            temperature: Some(29.5),
            ..Device::new(AC, "ac")
        };
        Arc::new(DataStore::new(vec![curtain, light, ac], DeviceMapping::new()))
    }

    fn spawn<A: ControlledAttribute>(
        store: &DataStore,
        id: DeviceId,
    ) -> (ControlHandle<A>, UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ControlSession::<A>::spawn(
            id,
            store.subscribe_devices(),
            Arc::new(tx),
            ControlTiming::default(),
            CancellationToken::new(),
        )
        .unwrap();
        (handle, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Command>) -> Vec<Command> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn set_position(store: &DataStore, position: u8) {
        store
            .update_device(CURTAIN, |d| d.position = Some(position))
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn curtain_holds_optimistic_value_then_confirms() {
        let store = store();
        let (handle, mut rx) = spawn::<CurtainPosition>(&store, CURTAIN);

        handle.send(Gesture::Start).await.unwrap();
        handle.send(Gesture::Update(80)).await.unwrap();
        handle.send(Gesture::Commit(80)).await.unwrap();
        settle().await;
        assert_eq!(
            drain(&mut rx),
            vec![Command::SetPosition {
                id: CURTAIN,
                position: 80
            }]
        );

        set_position(&store, 55);
        settle().await;
        let view = handle.view();
        assert_eq!(view.displayed, 80);
        assert_eq!(view.authoritative, 55);
        assert_eq!(view.phase, Phase::AwaitingConfirm);

        set_position(&store, 80);
        settle().await;
        let view = handle.view();
        assert_eq!(view.phase, Phase::Idle);
        assert_eq!(view.outcome, Some(Outcome::Confirmed(80)));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_commit_retries_twice_then_rolls_back() {
        let store = store();
        let (mut handle, mut rx) = spawn::<CurtainPosition>(&store, CURTAIN);

        let outcome = handle.perform(Gesture::Commit(80)).await.unwrap();
        assert_eq!(outcome, Some(Outcome::RolledBack(50)));

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|c| *c
            == Command::SetPosition {
                id: CURTAIN,
                position: 80
            }));
        assert_eq!(handle.view().displayed, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_hub_value_does_not_become_the_rollback_target() {
        let store = store();
        let (mut handle, _rx) = spawn::<CurtainPosition>(&store, CURTAIN);

        let hub = Arc::clone(&store);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(16)).await;
            set_position(&hub, 55);
        });

        let outcome = handle.perform(Gesture::Commit(80)).await.unwrap();
        assert_eq!(outcome, Some(Outcome::RolledBack(50)));
        assert_eq!(handle.view().authoritative, 55);
    }

    #[tokio::test(start_paused = true)]
    async fn hvac_off_confirms_when_hub_reports_off() {
        let store = store();
        store
            .update_device(AC, |d| {
                d.is_on = true;
                d.mode = Some("cool".into());
            })
            .unwrap();
        store.set_mapping([(AC, EntityId::from("climate.x"))].into_iter().collect());
        let (mut handle, mut rx) = spawn::<ClimateMode>(&store, AC);
        assert_eq!(handle.view().authoritative, "cool");

        let hub = Arc::clone(&store);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let snapshot: EntitySnapshot = [EntityState::new("climate.x", "off")]
                .into_iter()
                .collect();
            hub.apply_entities(snapshot);
        });

        let outcome = handle.perform(Gesture::Select("off".into())).await.unwrap();
        assert_eq!(outcome, Some(Outcome::Confirmed("off".into())));
        assert_eq!(
            drain(&mut rx).first(),
            Some(&Command::SetHvacMode {
                id: AC,
                mode: "off".into()
            })
        );

        let ac = store.device(AC).unwrap();
        assert!(!ac.is_on);
        assert_eq!(ac.mode.as_deref(), Some("cool"));
    }

    #[tokio::test(start_paused = true)]
    async fn new_gesture_cancels_pending_retries() {
        let store = store();
        let (handle, mut rx) = spawn::<CurtainPosition>(&store, CURTAIN);

        handle.send(Gesture::Commit(80)).await.unwrap();
        settle().await;
        handle.send(Gesture::Start).await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(drain(&mut rx).len(), 1);
        assert_eq!(handle.view().phase, Phase::Dragging);
        assert_eq!(handle.view().outcome, None);
    }

    #[tokio::test(start_paused = true)]
    async fn perform_confirms_when_hub_catches_up() {
        let store = store();
        let (mut handle, _rx) = spawn::<CurtainPosition>(&store, CURTAIN);

        let hub = Arc::clone(&store);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(700)).await;
            set_position(&hub, 79);
        });

        let outcome = handle.perform(Gesture::Commit(80)).await.unwrap();
        assert_eq!(outcome, Some(Outcome::Confirmed(79)));
    }

    #[tokio::test(start_paused = true)]
    async fn light_toggle_on_sends_plain_power() {
        let store = store();
        let (mut handle, mut rx) = spawn::<LightBrightness>(&store, LIGHT);

        let outcome = handle.perform(Gesture::Toggle).await.unwrap();
        assert_eq!(outcome, None);
        assert_eq!(
            drain(&mut rx),
            vec![Command::SetPower { id: LIGHT, on: true }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn setpoint_step_clamps_to_range() {
        let store = store();
        let (mut handle, mut rx) = spawn::<ClimateTemperature>(&store, AC);

        handle.send(Gesture::Step(1.0)).await.unwrap();
        settle().await;
        assert_eq!(
            drain(&mut rx),
            vec![Command::SetTemperature {
                id: AC,
                temperature: 30.0
            }]
        );

        assert_eq!(handle.perform(Gesture::Step(1.0)).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn select_of_displayed_value_is_a_noop() {
        let store = store();
        let (mut handle, mut rx) = spawn::<CurtainPosition>(&store, CURTAIN);

        assert_eq!(handle.perform(Gesture::Select(50)).await.unwrap(), None);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_session() {
        let store = store();
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = ControlSession::<CurtainPosition>::spawn(
            CURTAIN,
            store.subscribe_devices(),
            Arc::new(tx),
            ControlTiming::default(),
            cancel.clone(),
        )
        .unwrap();

        cancel.cancel();
        settle().await;
        assert!(handle.send(Gesture::Start).await.is_err());
    }

    #[tokio::test]
    async fn unknown_device_is_rejected() {
        let store = store();
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = ControlSession::<CurtainPosition>::spawn(
            DeviceId(99),
            store.subscribe_devices(),
            Arc::new(tx),
            ControlTiming::default(),
            CancellationToken::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, CoreError::DeviceNotFound { .. }));
    }
}
