use bevy::prelude::*;

use crate::events::{ChangeEvent, ChangeKind, ChangeNotifier};

/// Experience needed to advance one level.
const XP_PER_LEVEL: f32 = 100.0;

#[derive(Component, Clone, Copy, Debug, serde::Serialize)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn is_dead(&self) -> bool {
        self.current <= 0.0
    }
}

#[derive(Component, Clone, Copy, Debug, serde::Serialize)]
pub struct Energy {
    pub current: f32,
    pub max: f32,
}

impl Energy {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }
}

#[derive(Component, Clone, Copy, Debug, Default, serde::Serialize)]
pub struct Progress {
    pub experience: f32,
    pub level: u32,
}

/// Apply damage to an actor's health. Negative or non-finite amounts are
/// ignored silently. Returns true when the hit left the actor dead.
pub fn apply_damage(
    health: &mut Health,
    amount: f32,
    actor: u64,
    reason: &str,
    notifier: &mut ChangeNotifier,
    frame: u64,
) -> bool {
    if !amount.is_finite() || amount < 0.0 {
        return health.is_dead();
    }
    let old = health.current;
    health.current = (health.current - amount).max(0.0);
    if health.current != old {
        notifier.emit(ChangeEvent::new(
            actor,
            ChangeKind::HealthChanged,
            old,
            health.current,
            reason,
            frame,
        ));
    }
    health.is_dead()
}

/// Restore health up to max. Negative or non-finite amounts are ignored.
pub fn heal(
    health: &mut Health,
    amount: f32,
    actor: u64,
    reason: &str,
    notifier: &mut ChangeNotifier,
    frame: u64,
) {
    if !amount.is_finite() || amount < 0.0 {
        return;
    }
    let old = health.current;
    health.current = (health.current + amount).min(health.max);
    if health.current != old {
        notifier.emit(ChangeEvent::new(
            actor,
            ChangeKind::HealthChanged,
            old,
            health.current,
            reason,
            frame,
        ));
    }
}

/// Reassign max health. Zero or negative values leave the stat untouched;
/// current health is clamped into the new range.
pub fn set_max_health(health: &mut Health, new_max: f32) {
    if !new_max.is_finite() || new_max <= 0.0 {
        return;
    }
    health.max = new_max;
    health.current = health.current.min(new_max);
}

/// Spend energy for an ability. Returns false (leaving state untouched) when
/// there is not enough; a non-positive cost is a no-op that always succeeds.
pub fn spend_energy(
    energy: &mut Energy,
    cost: f32,
    actor: u64,
    reason: &str,
    notifier: &mut ChangeNotifier,
    frame: u64,
) -> bool {
    if !cost.is_finite() || cost <= 0.0 {
        return true;
    }
    if energy.current < cost {
        return false;
    }
    let old = energy.current;
    energy.current -= cost;
    notifier.emit(ChangeEvent::new(
        actor,
        ChangeKind::EnergyChanged,
        old,
        energy.current,
        reason,
        frame,
    ));
    true
}

/// Recover energy up to max. Negative or non-finite amounts are ignored.
pub fn gain_energy(
    energy: &mut Energy,
    amount: f32,
    actor: u64,
    reason: &str,
    notifier: &mut ChangeNotifier,
    frame: u64,
) {
    if !amount.is_finite() || amount < 0.0 {
        return;
    }
    let old = energy.current;
    energy.current = (energy.current + amount).min(energy.max);
    if energy.current != old {
        notifier.emit(ChangeEvent::new(
            actor,
            ChangeKind::EnergyChanged,
            old,
            energy.current,
            reason,
            frame,
        ));
    }
}

/// Grant experience, emitting one level-up event per level crossed.
pub fn grant_experience(
    progress: &mut Progress,
    amount: f32,
    actor: u64,
    notifier: &mut ChangeNotifier,
    frame: u64,
) {
    if !amount.is_finite() || amount < 0.0 {
        return;
    }
    progress.experience += amount;
    while progress.experience >= XP_PER_LEVEL {
        progress.experience -= XP_PER_LEVEL;
        let old_level = progress.level;
        progress.level += 1;
        notifier.emit(ChangeEvent::new(
            actor,
            ChangeKind::LevelUp,
            old_level as f32,
            progress.level as f32,
            "experience",
            frame,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_damage_is_ignored_silently() {
        let mut notifier = ChangeNotifier::default();
        let rx = notifier.subscribe(1);
        let mut health = Health::new(100.0);

        apply_damage(&mut health, -25.0, 1, "attack", &mut notifier, 1);
        assert_eq!(health.current, 100.0);
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn damage_clamps_at_zero_and_reports_death() {
        let mut notifier = ChangeNotifier::default();
        let mut health = Health::new(30.0);

        assert!(!apply_damage(&mut health, 20.0, 1, "attack", &mut notifier, 1));
        assert!(apply_damage(&mut health, 50.0, 1, "attack", &mut notifier, 2));
        assert_eq!(health.current, 0.0);
    }

    #[test]
    fn health_change_event_carries_delta_and_rounded_amount() {
        let mut notifier = ChangeNotifier::default();
        let rx = notifier.subscribe(1);
        let mut health = Health::new(100.0);

        apply_damage(&mut health, 12.5, 1, "attack", &mut notifier, 7);
        let event = rx.try_recv().expect("health event");
        assert_eq!(event.kind, ChangeKind::HealthChanged);
        assert_eq!(event.old_value, 100.0);
        assert_eq!(event.new_value, 87.5);
        assert_eq!(event.amount, -13);
        assert_eq!(event.reason, "attack");
        assert_eq!(event.frame, 7);
    }

    #[test]
    fn zero_or_negative_max_health_assignment_is_a_no_op() {
        let mut health = Health::new(100.0);
        set_max_health(&mut health, 0.0);
        set_max_health(&mut health, -5.0);
        assert_eq!(health.max, 100.0);

        set_max_health(&mut health, 40.0);
        assert_eq!(health.max, 40.0);
        assert_eq!(health.current, 40.0);
    }

    #[test]
    fn insufficient_energy_blocks_the_spend() {
        let mut notifier = ChangeNotifier::default();
        let mut energy = Energy::new(10.0);

        assert!(!spend_energy(&mut energy, 25.0, 1, "dash", &mut notifier, 1));
        assert_eq!(energy.current, 10.0);
        assert!(spend_energy(&mut energy, 10.0, 1, "dash", &mut notifier, 1));
        assert_eq!(energy.current, 0.0);
    }

    #[test]
    fn negative_energy_amounts_are_ignored() {
        let mut notifier = ChangeNotifier::default();
        let mut energy = Energy::new(50.0);
        energy.current = 20.0;

        gain_energy(&mut energy, -10.0, 1, "regen", &mut notifier, 1);
        assert_eq!(energy.current, 20.0);
        assert!(spend_energy(&mut energy, -5.0, 1, "dash", &mut notifier, 1));
        assert_eq!(energy.current, 20.0);
    }

    #[test]
    fn experience_grants_cross_levels_one_event_each() {
        let mut notifier = ChangeNotifier::default();
        let rx = notifier.subscribe(1);
        let mut progress = Progress::default();

        grant_experience(&mut progress, 250.0, 1, &mut notifier, 1);
        assert_eq!(progress.level, 2);
        assert!((progress.experience - 50.0).abs() < 1e-6);
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == ChangeKind::LevelUp));
    }
}
