//! Authoritative combat state and transition logic.
//!
//! The engine owns the boss, the shared hero stats, the global combo
//! streak, and the bounded attack log. It performs no I/O and takes the
//! current time as an explicit millisecond instant, so every transition
//! is deterministic and directly testable. Rate limiting is the session
//! layer's job; the engine applies any attack handed to it as long as
//! the boss is alive.

use log::info;
use shared::{
    combo_multiplier_percent, AttackEntry, BossView, ComboView, GameStateView, HeroView,
    ATTACK_LOG_CAPACITY, COMBO_WINDOW_MS, RECENT_ATTACKERS,
};
use std::collections::VecDeque;
use std::fmt;

/// The shared destructible target.
#[derive(Debug, Clone)]
pub struct Boss {
    pub name: String,
    pub current_hp: u32,
    pub max_hp: u32,
    pub is_alive: bool,
}

/// Process-wide collective damage stats; immutable during play.
#[derive(Debug, Clone)]
pub struct Hero {
    pub base_attack: f64,
    pub power_multiplier: f64,
}

/// The global combo streak shared by every attacker.
///
/// The multiplier is stored in integer percent so threshold math stays
/// exact; it only ever rises within a streak and drops back to 100 when
/// the streak breaks or the engine is reset.
#[derive(Debug, Clone)]
pub struct Combo {
    pub count: u32,
    pub last_attack_ms: u64,
    pub multiplier_percent: u32,
}

impl Combo {
    pub fn multiplier(&self) -> f64 {
        self.multiplier_percent as f64 / 100.0
    }
}

/// Result record for one landed attack.
#[derive(Debug, Clone, PartialEq)]
pub struct AttackOutcome {
    pub damage: u32,
    pub boss_hp: u32,
    pub boss_max_hp: u32,
    pub combo_count: u32,
    pub combo_multiplier_percent: u32,
    pub boss_defeated: bool,
}

impl AttackOutcome {
    pub fn combo_multiplier(&self) -> f64 {
        self.combo_multiplier_percent as f64 / 100.0
    }
}

/// Rejection from the engine itself (as opposed to session-level rules).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackError {
    /// The boss was already dead when the attack arrived; nothing changed.
    AlreadyDefeated,
}

impl fmt::Display for AttackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttackError::AlreadyDefeated => write!(f, "Boss already defeated"),
        }
    }
}

impl std::error::Error for AttackError {}

/// Authoritative combat engine: one boss, one hero stat block, one
/// global combo, one bounded attack log.
#[derive(Debug, Clone)]
pub struct CombatEngine {
    boss: Boss,
    hero: Hero,
    combo: Combo,
    attack_log: VecDeque<AttackEntry>,
}

impl CombatEngine {
    pub fn new(boss_name: &str, max_hp: u32, base_attack: f64, power_multiplier: f64) -> Self {
        Self {
            boss: Boss {
                name: boss_name.to_string(),
                current_hp: max_hp,
                max_hp,
                is_alive: true,
            },
            hero: Hero {
                base_attack,
                power_multiplier,
            },
            combo: Combo {
                count: 0,
                last_attack_ms: 0,
                multiplier_percent: 100,
            },
            attack_log: VecDeque::with_capacity(ATTACK_LOG_CAPACITY),
        }
    }

    /// Applies one attack at the given instant.
    ///
    /// Fails with [`AttackError::AlreadyDefeated`] (no state change) if
    /// the boss is dead. Otherwise: continues or restarts the combo
    /// streak depending on the gap since the previous attack, deals
    /// `floor(base * power * multiplier)` damage clamped at 0 HP, logs
    /// the hit, and reports the resulting state.
    pub fn attack(&mut self, username: &str, now_ms: u64) -> Result<AttackOutcome, AttackError> {
        if !self.boss.is_alive {
            return Err(AttackError::AlreadyDefeated);
        }

        let raw_damage = self.hero.base_attack * self.hero.power_multiplier;

        if now_ms.saturating_sub(self.combo.last_attack_ms) < COMBO_WINDOW_MS {
            self.combo.count += 1;
            self.combo.multiplier_percent = combo_multiplier_percent(self.combo.count);
        } else {
            self.combo.count = 1;
            self.combo.multiplier_percent = 100;
        }
        self.combo.last_attack_ms = now_ms;

        // Truncation, not rounding, is the intended tie-break.
        let damage = (raw_damage * self.combo.multiplier_percent as f64 / 100.0).floor() as u32;

        self.boss.current_hp = self.boss.current_hp.saturating_sub(damage);
        if self.boss.current_hp == 0 {
            self.boss.is_alive = false;
            info!("Boss '{}' defeated by {}", self.boss.name, username);
        }

        self.attack_log.push_back(AttackEntry {
            username: username.to_string(),
            damage,
            timestamp: now_ms,
        });
        if self.attack_log.len() > ATTACK_LOG_CAPACITY {
            self.attack_log.pop_front();
        }

        Ok(AttackOutcome {
            damage,
            boss_hp: self.boss.current_hp,
            boss_max_hp: self.boss.max_hp,
            combo_count: self.combo.count,
            combo_multiplier_percent: self.combo.multiplier_percent,
            boss_defeated: !self.boss.is_alive,
        })
    }

    /// Read-only projection of the current state: boss, hero, combo, and
    /// the newest log entries. Always cloned, never a live reference.
    pub fn snapshot(&self) -> GameStateView {
        let recent_start = self.attack_log.len().saturating_sub(RECENT_ATTACKERS);
        GameStateView {
            boss: BossView {
                name: self.boss.name.clone(),
                current_hp: self.boss.current_hp,
                max_hp: self.boss.max_hp,
                is_alive: self.boss.is_alive,
            },
            hero: HeroView {
                base_attack: self.hero.base_attack,
                power_multiplier: self.hero.power_multiplier,
            },
            combo: ComboView {
                count: self.combo.count,
                multiplier: self.combo.multiplier(),
            },
            recent_attackers: self
                .attack_log
                .iter()
                .skip(recent_start)
                .cloned()
                .collect(),
        }
    }

    /// Full attack log, oldest first. Lossy beyond capacity; used for
    /// the defeat summary and the status surface.
    pub fn attackers(&self) -> Vec<AttackEntry> {
        self.attack_log.iter().cloned().collect()
    }

    pub fn logged_attacks(&self) -> usize {
        self.attack_log.len()
    }

    pub fn boss(&self) -> &Boss {
        &self.boss
    }

    pub fn combo(&self) -> &Combo {
        &self.combo
    }

    /// Restores the boss to full HP, zeroes the combo, and clears the
    /// attack log. The only way back from DEAD to ALIVE.
    pub fn reset(&mut self) {
        self.boss.current_hp = self.boss.max_hp;
        self.boss.is_alive = true;
        self.combo.count = 0;
        self.combo.multiplier_percent = 100;
        self.attack_log.clear();
        info!("Boss '{}' reset to {} HP", self.boss.name, self.boss.max_hp);
    }
}

impl Default for CombatEngine {
    fn default() -> Self {
        Self::new(
            shared::BOSS_NAME,
            shared::BOSS_MAX_HP,
            shared::HERO_BASE_ATTACK,
            shared::HERO_POWER_MULTIPLIER,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn engine() -> CombatEngine {
        CombatEngine::default()
    }

    #[test]
    fn test_first_attack_cold_combo() {
        let mut engine = engine();
        let outcome = engine.attack("ember", 10_000).unwrap();

        assert_eq!(outcome.damage, 100);
        assert_eq!(outcome.combo_count, 1);
        assert_eq!(outcome.combo_multiplier_percent, 100);
        assert_eq!(outcome.boss_hp, 9_900);
        assert!(!outcome.boss_defeated);
    }

    #[test]
    fn test_damage_is_deterministic() {
        for _ in 0..3 {
            let mut engine = engine();
            let outcome = engine.attack("ember", 10_000).unwrap();
            assert_eq!(outcome.damage, 100);
        }
    }

    #[test]
    fn test_combo_streak_reaches_first_threshold() {
        let mut engine = engine();

        let mut last = None;
        for i in 0..10 {
            // 1 second apart, well inside the 3 second window.
            last = Some(engine.attack("ember", 10_000 + i * 1_000).unwrap());
        }

        let tenth = last.unwrap();
        assert_eq!(tenth.combo_count, 10);
        assert_eq!(tenth.combo_multiplier_percent, 120);
        assert_eq!(tenth.damage, 120); // floor(100 * 1.2)
    }

    #[test]
    fn test_combo_monotone_within_streak() {
        let mut engine = engine();

        let mut prev_count = 0;
        let mut prev_percent = 0;
        for i in 0..60 {
            let outcome = engine.attack("ember", 10_000 + i * 500).unwrap();
            assert!(outcome.combo_count > prev_count);
            assert!(outcome.combo_multiplier_percent >= prev_percent);
            prev_count = outcome.combo_count;
            prev_percent = outcome.combo_multiplier_percent;
        }
        assert_eq!(prev_count, 60);
        assert_eq!(prev_percent, 200);
    }

    #[test]
    fn test_combo_resets_after_window() {
        let mut engine = engine();

        for i in 0..12 {
            engine.attack("ember", 10_000 + i * 100).unwrap();
        }
        assert_eq!(engine.combo().count, 12);
        assert_eq!(engine.combo().multiplier_percent, 120);

        // Exactly the window width is a gap, not a continuation.
        let last = engine.combo().last_attack_ms;
        let outcome = engine.attack("ember", last + COMBO_WINDOW_MS).unwrap();
        assert_eq!(outcome.combo_count, 1);
        assert_eq!(outcome.combo_multiplier_percent, 100);
        assert_eq!(outcome.damage, 100);
    }

    #[test]
    fn test_gap_just_inside_window_continues_streak() {
        let mut engine = engine();
        engine.attack("ember", 10_000).unwrap();
        let outcome = engine.attack("ember", 10_000 + COMBO_WINDOW_MS - 1).unwrap();
        assert_eq!(outcome.combo_count, 2);
    }

    #[test]
    fn test_hp_clamped_and_death_transition() {
        let mut engine = CombatEngine::new("Test Slime", 50, 100.0, 1.0);
        let outcome = engine.attack("ember", 10_000).unwrap();

        assert_eq!(outcome.boss_hp, 0);
        assert!(outcome.boss_defeated);
        assert!(!engine.boss().is_alive);
        assert_eq!(engine.boss().current_hp, 0);
    }

    #[test]
    fn test_attack_after_defeat_changes_nothing() {
        let mut engine = CombatEngine::new("Test Slime", 100, 100.0, 1.0);
        engine.attack("ember", 10_000).unwrap();
        assert!(!engine.boss().is_alive);

        let logged = engine.logged_attacks();
        let combo = engine.combo().count;

        let err = engine.attack("ash", 10_100).unwrap_err();
        assert_eq!(err, AttackError::AlreadyDefeated);
        assert_eq!(engine.boss().current_hp, 0);
        assert_eq!(engine.logged_attacks(), logged);
        assert_eq!(engine.combo().count, combo);
    }

    #[test]
    fn test_hp_invariant_over_random_sequences() {
        let mut engine = CombatEngine::new("Test Slime", 1_000, 100.0, 1.0);
        let mut now = 10_000;

        loop {
            now += if now % 7_000 < 3_500 { 200 } else { 4_000 };
            match engine.attack("ember", now) {
                Ok(outcome) => {
                    assert!(outcome.boss_hp <= engine.boss().max_hp);
                    assert_eq!(engine.boss().is_alive, engine.boss().current_hp > 0);
                }
                Err(AttackError::AlreadyDefeated) => break,
            }
        }
        assert_eq!(engine.boss().current_hp, 0);
    }

    #[test]
    fn test_attack_log_fifo_eviction() {
        let mut engine = CombatEngine::new("Test Slime", u32::MAX, 100.0, 1.0);

        for i in 0..105u64 {
            engine.attack(&format!("user{}", i), 10_000 + i * 100).unwrap();
        }

        let attackers = engine.attackers();
        assert_eq!(attackers.len(), ATTACK_LOG_CAPACITY);
        // The first 5 entries were evicted.
        assert_eq!(attackers[0].username, "user5");
        assert_eq!(attackers.last().unwrap().username, "user104");
    }

    #[test]
    fn test_snapshot_reports_last_ten_attackers() {
        let mut engine = engine();
        for i in 0..15u64 {
            engine.attack(&format!("user{}", i), 10_000 + i * 100).unwrap();
        }

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.recent_attackers.len(), 10);
        assert_eq!(snapshot.recent_attackers[0].username, "user5");
        assert_eq!(snapshot.recent_attackers[9].username, "user14");
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let mut engine = engine();
        engine.attack("ember", 10_000).unwrap();

        let mut snapshot = engine.snapshot();
        snapshot.boss.current_hp = 1;
        snapshot.recent_attackers.clear();

        assert_eq!(engine.boss().current_hp, 9_900);
        assert_eq!(engine.logged_attacks(), 1);
    }

    #[test]
    fn test_reset_restores_everything() {
        let mut engine = engine();
        for i in 0..30u64 {
            engine.attack("ember", 10_000 + i * 100).unwrap();
        }
        engine.reset();

        assert_eq!(engine.boss().current_hp, engine.boss().max_hp);
        assert!(engine.boss().is_alive);
        assert_eq!(engine.combo().count, 0);
        assert_eq!(engine.combo().multiplier_percent, 100);
        assert_eq!(engine.logged_attacks(), 0);
        assert_approx_eq!(engine.snapshot().combo.multiplier, 1.0);
    }

    #[test]
    fn test_reset_revives_dead_boss() {
        let mut engine = CombatEngine::new("Test Slime", 100, 100.0, 1.0);
        engine.attack("ember", 10_000).unwrap();
        assert!(!engine.boss().is_alive);

        engine.reset();
        assert!(engine.boss().is_alive);
        engine.attack("ember", 20_000).unwrap();
    }
}
