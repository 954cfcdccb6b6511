use std::collections::HashMap;

use bevy::prelude::*;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;

/// What changed on an actor this tick.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    HealthChanged,
    EnergyChanged,
    AbilityActivated,
    NearEdgeChanged,
    LevelUp,
}

/// Change notification delivered to observers of a single actor.
///
/// `amount` is the integer view of the change: `delta.round()` (round
/// half-away-from-zero). The raw f32 old/new values ride alongside so
/// consumers that need them are not forced through the rounding.
#[derive(Clone, Debug, Serialize)]
pub struct ChangeEvent {
    pub actor: u64,
    pub kind: ChangeKind,
    pub old_value: f32,
    pub new_value: f32,
    pub delta: f32,
    pub amount: i64,
    pub reason: String,
    pub frame: u64,
}

impl ChangeEvent {
    pub fn new(
        actor: u64,
        kind: ChangeKind,
        old_value: f32,
        new_value: f32,
        reason: impl Into<String>,
        frame: u64,
    ) -> Self {
        let delta = new_value - old_value;
        Self {
            actor,
            kind,
            old_value,
            new_value,
            delta,
            amount: delta.round() as i64,
            reason: reason.into(),
            frame,
        }
    }
}

/// Per-actor observer registry. Subscriptions are scoped to one actor and
/// torn down when that actor leaves the simulation, so listeners never
/// accumulate process-wide.
#[derive(Resource, Default)]
pub struct ChangeNotifier {
    observers: HashMap<u64, Vec<Sender<ChangeEvent>>>,
    pub dropped: u64,
}

impl ChangeNotifier {
    pub fn subscribe(&mut self, actor: u64) -> Receiver<ChangeEvent> {
        let (tx, rx) = unbounded();
        self.observers.entry(actor).or_default().push(tx);
        rx
    }

    /// Deliver an event to the actor's observers, pruning any whose receiver
    /// has been dropped.
    pub fn emit(&mut self, event: ChangeEvent) {
        let Some(senders) = self.observers.get_mut(&event.actor) else {
            return;
        };
        senders.retain(|tx| tx.send(event.clone()).is_ok());
        if senders.is_empty() {
            self.observers.remove(&event.actor);
        }
    }

    /// Remove every observer registered for an actor. Called when the actor
    /// is destroyed.
    pub fn teardown(&mut self, actor: u64) {
        if let Some(senders) = self.observers.remove(&actor) {
            self.dropped = self.dropped.saturating_add(senders.len() as u64);
        }
    }

    pub fn observer_count(&self, actor: u64) -> usize {
        self.observers.get(&actor).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_rounds_the_delta_half_away_from_zero() {
        let up = ChangeEvent::new(1, ChangeKind::HealthChanged, 100.0, 87.5, "attack", 3);
        assert_eq!(up.amount, -13);
        assert!((up.delta + 12.5).abs() < 1e-6);

        let down = ChangeEvent::new(1, ChangeKind::EnergyChanged, 10.0, 22.5, "regen", 3);
        assert_eq!(down.amount, 13);
    }

    #[test]
    fn events_only_reach_observers_of_the_same_actor() {
        let mut notifier = ChangeNotifier::default();
        let rx_a = notifier.subscribe(1);
        let rx_b = notifier.subscribe(2);

        notifier.emit(ChangeEvent::new(
            1,
            ChangeKind::HealthChanged,
            100.0,
            90.0,
            "attack",
            1,
        ));

        assert_eq!(rx_a.try_iter().count(), 1);
        assert_eq!(rx_b.try_iter().count(), 0);
    }

    #[test]
    fn teardown_removes_all_observers_for_the_actor() {
        let mut notifier = ChangeNotifier::default();
        let _rx = notifier.subscribe(5);
        let _rx2 = notifier.subscribe(5);
        assert_eq!(notifier.observer_count(5), 2);

        notifier.teardown(5);
        assert_eq!(notifier.observer_count(5), 0);
        assert_eq!(notifier.dropped, 2);
    }

    #[test]
    fn disconnected_observers_are_pruned_on_emit() {
        let mut notifier = ChangeNotifier::default();
        let rx = notifier.subscribe(9);
        drop(rx);

        notifier.emit(ChangeEvent::new(
            9,
            ChangeKind::EnergyChanged,
            0.0,
            5.0,
            "regen",
            1,
        ));
        assert_eq!(notifier.observer_count(9), 0);
    }
}
