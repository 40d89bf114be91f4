//! Wire protocol and shared game definitions for the boss raid server.
//!
//! Everything that crosses the network lives here: the [`Packet`] enum
//! (serialized with bincode), the read-only state views sent inside it,
//! and the tuning constants both sides agree on.

use serde::{Deserialize, Serialize};

/// Display name of the shared boss.
pub const BOSS_NAME: &str = "Magma Slime";
/// Boss hit points at spawn and after every reset.
pub const BOSS_MAX_HP: u32 = 10_000;
/// Collective base attack of the raiding heroes.
pub const HERO_BASE_ATTACK: f64 = 100.0;
/// Collective power multiplier applied on top of the base attack.
pub const HERO_POWER_MULTIPLIER: f64 = 1.0;
/// Maximum gap between attacks that keeps a combo streak alive.
pub const COMBO_WINDOW_MS: u64 = 3_000;
/// Minimum spacing between accepted attacks from the same username.
pub const ATTACK_COOLDOWN_MS: u64 = 500;
/// Ring-buffer capacity of the attack log; oldest entries are evicted.
pub const ATTACK_LOG_CAPACITY: usize = 100;
/// How many of the newest log entries a snapshot reports.
pub const RECENT_ATTACKERS: usize = 10;
/// Delay between the killing blow and the defeat broadcast, so the
/// killing-blow presentation finishes client-side first.
pub const DEFEAT_BROADCAST_DELAY_MS: u64 = 500;

/// Combo multiplier in integer percent for a given streak count.
///
/// Kept in percent so threshold logic compares exactly; the f64 the
/// wire carries is derived from this at the boundary.
pub fn combo_multiplier_percent(count: u32) -> u32 {
    if count >= 50 {
        200
    } else if count >= 25 {
        150
    } else if count >= 10 {
        120
    } else {
        100
    }
}

/// Read-only view of the boss.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BossView {
    pub name: String,
    pub current_hp: u32,
    pub max_hp: u32,
    pub is_alive: bool,
}

/// Read-only view of the shared hero stats.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HeroView {
    pub base_attack: f64,
    pub power_multiplier: f64,
}

/// Read-only view of the shared combo streak.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ComboView {
    pub count: u32,
    pub multiplier: f64,
}

/// One logged hit: who, how hard, when (unix millis).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AttackEntry {
    pub username: String,
    pub damage: u32,
    pub timestamp: u64,
}

/// Point-in-time projection of the whole game state, sent to a client
/// on connect and broadcast after a reset.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GameStateView {
    pub boss: BossView,
    pub hero: HeroView,
    pub combo: ComboView,
    pub recent_attackers: Vec<AttackEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    // Client -> server
    Connect {
        client_version: u32,
    },
    Attack {
        username: String,
    },
    ResetBoss,
    StatusRequest,
    /// Liveness touch; carries no game semantics.
    Ping,
    Disconnect,

    // Server -> client
    Connected {
        client_id: u32,
    },
    GameState(GameStateView),
    /// Broadcast to every connected client on each landed hit.
    AttackResult {
        username: String,
        damage: u32,
        boss_hp: u32,
        boss_max_hp: u32,
        combo: u32,
        combo_multiplier: f64,
        boss_defeated: bool,
    },
    /// Broadcast once, a fixed delay after the killing blow.
    ///
    /// `total_attacks` counts logged attacks only (the log holds at most
    /// [`ATTACK_LOG_CAPACITY`] entries); it is not a lifetime counter.
    BossDefeated {
        attackers: Vec<AttackEntry>,
        total_attacks: u32,
        boss_name: String,
    },
    /// Broadcast after the post-reset `GameState`, in that order.
    BossReset,
    /// Sent only to the client whose request was rejected.
    Error {
        message: String,
        remaining_ms: Option<u64>,
    },
    /// Reply to `StatusRequest`; diagnostic read, no side effects.
    Status {
        boss_name: String,
        boss_hp: u32,
        boss_max_hp: u32,
        hp_percent: f64,
        boss_alive: bool,
        combo_count: u32,
        combo_multiplier: f64,
        attackers_logged: u32,
        connected_clients: u32,
    },
    Disconnected {
        reason: String,
    },
}
