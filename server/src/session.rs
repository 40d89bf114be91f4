//! Session rules sitting between the transport and the combat engine.
//!
//! The [`GameSession`] owns the engine and the per-username cooldown
//! registry and applies the acceptance rules for inbound requests:
//! username present, cooldown elapsed, boss alive. Keeping this apart
//! from the socket code means every rejection path is testable with
//! plain function calls and injected timestamps.

use crate::engine::{AttackError, AttackOutcome, CombatEngine};
use log::debug;
use shared::{GameStateView, ATTACK_COOLDOWN_MS};
use std::collections::HashMap;
use std::fmt;

/// Why an attack request was turned away. Delivered only to the
/// requesting client, never broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Request carried no username.
    MissingUsername,
    /// Same username attacked again inside the cooldown window.
    CooldownActive { remaining_ms: u64 },
    /// The boss was already dead.
    AlreadyDefeated,
}

impl RejectReason {
    /// Retry-after hint for the wire, present only for cooldowns.
    pub fn remaining_ms(&self) -> Option<u64> {
        match self {
            RejectReason::CooldownActive { remaining_ms } => Some(*remaining_ms),
            _ => None,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MissingUsername => write!(f, "Username required"),
            RejectReason::CooldownActive { .. } => write!(f, "Cooldown active"),
            RejectReason::AlreadyDefeated => write!(f, "Boss already defeated"),
        }
    }
}

/// Last successful attack instant per username.
///
/// Usernames are unverified strings; spoofable identity is an accepted
/// limitation of the game, not a security boundary. Entries appear on
/// first success and the whole map is wiped on reset.
#[derive(Debug, Default)]
pub struct CooldownRegistry {
    last_attack_ms: HashMap<String, u64>,
}

impl CooldownRegistry {
    /// Milliseconds still left on the username's cooldown, if any.
    pub fn remaining(&self, username: &str, now_ms: u64) -> Option<u64> {
        let last = *self.last_attack_ms.get(username)?;
        let elapsed = now_ms.saturating_sub(last);
        if elapsed < ATTACK_COOLDOWN_MS {
            Some(ATTACK_COOLDOWN_MS - elapsed)
        } else {
            None
        }
    }

    pub fn record(&mut self, username: &str, now_ms: u64) {
        self.last_attack_ms.insert(username.to_string(), now_ms);
    }

    pub fn clear(&mut self) {
        self.last_attack_ms.clear();
    }

    pub fn len(&self) -> usize {
        self.last_attack_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_attack_ms.is_empty()
    }
}

/// One shared raid: the engine plus the fairness rules applied in front
/// of it. Owned by the server's event loop; all mutation funnels
/// through that single task.
#[derive(Debug, Default)]
pub struct GameSession {
    engine: CombatEngine,
    cooldowns: CooldownRegistry,
}

impl GameSession {
    pub fn new(engine: CombatEngine) -> Self {
        Self {
            engine,
            cooldowns: CooldownRegistry::default(),
        }
    }

    /// Arbitrates one attack request at the given instant.
    ///
    /// Rejections leave all state untouched; in particular a stray
    /// attack on an already-dead boss does not consume the user's
    /// cooldown, so they are not penalized for a race they lost.
    pub fn handle_attack(
        &mut self,
        username: &str,
        now_ms: u64,
    ) -> Result<AttackOutcome, RejectReason> {
        if username.is_empty() {
            return Err(RejectReason::MissingUsername);
        }

        if let Some(remaining_ms) = self.cooldowns.remaining(username, now_ms) {
            debug!("Cooldown rejection for '{}' ({} ms left)", username, remaining_ms);
            return Err(RejectReason::CooldownActive { remaining_ms });
        }

        match self.engine.attack(username, now_ms) {
            Ok(outcome) => {
                self.cooldowns.record(username, now_ms);
                Ok(outcome)
            }
            Err(AttackError::AlreadyDefeated) => Err(RejectReason::AlreadyDefeated),
        }
    }

    /// Resets the raid: fresh boss, zeroed combo, cleared attack log,
    /// and a full wipe of the cooldown registry.
    pub fn handle_reset(&mut self) {
        self.engine.reset();
        self.cooldowns.clear();
    }

    pub fn snapshot(&self) -> GameStateView {
        self.engine.snapshot()
    }

    pub fn engine(&self) -> &CombatEngine {
        &self.engine
    }

    pub fn cooldowns(&self) -> &CooldownRegistry {
        &self.cooldowns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> GameSession {
        GameSession::default()
    }

    #[test]
    fn test_missing_username_rejected() {
        let mut session = session();
        let err = session.handle_attack("", 10_000).unwrap_err();
        assert_eq!(err, RejectReason::MissingUsername);
        assert_eq!(session.engine().logged_attacks(), 0);
        assert!(session.cooldowns().is_empty());
    }

    #[test]
    fn test_attack_records_cooldown() {
        let mut session = session();
        session.handle_attack("ember", 10_000).unwrap();
        assert_eq!(session.cooldowns().len(), 1);
    }

    #[test]
    fn test_second_attack_within_cooldown_rejected() {
        let mut session = session();
        let first = session.handle_attack("ember", 10_000).unwrap();

        let err = session.handle_attack("ember", 10_200).unwrap_err();
        assert_eq!(err, RejectReason::CooldownActive { remaining_ms: 300 });
        assert_eq!(err.remaining_ms(), Some(300));

        // Engine state is unchanged from the first call's result.
        let snapshot = session.snapshot();
        assert_eq!(snapshot.boss.current_hp, first.boss_hp);
        assert_eq!(snapshot.combo.count, first.combo_count);
        assert_eq!(session.engine().logged_attacks(), 1);
    }

    #[test]
    fn test_attack_allowed_at_cooldown_boundary() {
        let mut session = session();
        session.handle_attack("ember", 10_000).unwrap();
        let outcome = session.handle_attack("ember", 10_000 + ATTACK_COOLDOWN_MS).unwrap();
        assert_eq!(outcome.combo_count, 2);
    }

    #[test]
    fn test_cooldowns_are_per_username() {
        let mut session = session();
        session.handle_attack("ember", 10_000).unwrap();

        // A different username is not throttled by ember's cooldown,
        // and its hit continues the shared combo streak.
        let outcome = session.handle_attack("ash", 10_100).unwrap();
        assert_eq!(outcome.combo_count, 2);
    }

    #[test]
    fn test_defeat_rejection_spares_cooldown() {
        let mut session = GameSession::new(CombatEngine::new("Test Slime", 100, 100.0, 1.0));
        session.handle_attack("ember", 10_000).unwrap();

        let err = session.handle_attack("ash", 10_100).unwrap_err();
        assert_eq!(err, RejectReason::AlreadyDefeated);
        // ash never landed a hit, so ash has no cooldown entry.
        assert!(session.cooldowns().remaining("ash", 10_150).is_none());
        assert_eq!(session.cooldowns().len(), 1);
    }

    #[test]
    fn test_reset_wipes_cooldown_registry() {
        let mut session = session();
        session.handle_attack("ember", 10_000).unwrap();
        session.handle_attack("ash", 10_100).unwrap();
        assert_eq!(session.cooldowns().len(), 2);

        session.handle_reset();
        assert!(session.cooldowns().is_empty());
        assert_eq!(session.snapshot().boss.current_hp, shared::BOSS_MAX_HP);

        // Immediately attackable again, no stale cooldown.
        session.handle_attack("ember", 10_150).unwrap();
    }

    #[test]
    fn test_full_raid_until_defeat() {
        let mut session = GameSession::new(CombatEngine::new("Test Slime", 1_000, 100.0, 1.0));
        let mut now = 10_000;
        let mut last = None;

        // Two users alternating every 300 ms; each individually clears
        // the 500 ms cooldown while keeping the combo window alive.
        for i in 0..10 {
            let user = if i % 2 == 0 { "ember" } else { "ash" };
            last = Some(session.handle_attack(user, now).unwrap());
            now += 300;
        }

        let last = last.unwrap();
        assert!(last.boss_defeated);
        assert_eq!(last.boss_hp, 0);
        assert_eq!(last.combo_count, 10);
    }
}
