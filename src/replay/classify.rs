//! Classification of raw events into match events.
//!
//! A [`MatchEvent`] is the immutable, human-readable record pushed to
//! downstream consumers: a stable key, a generated description, the
//! owning and opposing profiles, the owner's score at that instant,
//! and a snapshot of every active player. Construction is stateless;
//! all game knowledge lives in the state machine that invokes it.

use serde::Serialize;
use tracing::{debug, warn};

use crate::replay::player::{PlayerId, PlayerSnapshot, Roster};

/// The closed set of match event kinds.
///
/// Serialized as the stable string keys downstream storage indexes by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchEventKind {
    /// A bunker began construction after game start.
    BunkerStarted,
    /// A siege tank began construction.
    TankStarted,
    /// A bunker was destroyed by an opponent.
    BunkerKilled,
    /// A bunker was cancelled by its owner.
    BunkerCancelled,
    /// A nuke resolved; valued by the next score delta.
    PlayerNuked,
    /// A player was eliminated by an opponent.
    PlayerDied,
    /// A player left without being killed.
    PlayerLeave,
    /// A player cancelled their own last bunker.
    PlayerSuicide,
}

impl MatchEventKind {
    /// The stable string key.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            MatchEventKind::BunkerStarted => "bunker_started",
            MatchEventKind::TankStarted => "tank_started",
            MatchEventKind::BunkerKilled => "bunker_killed",
            MatchEventKind::BunkerCancelled => "bunker_cancelled",
            MatchEventKind::PlayerNuked => "player_nuked",
            MatchEventKind::PlayerDied => "player_died",
            MatchEventKind::PlayerLeave => "player_leave",
            MatchEventKind::PlayerSuicide => "player_suicide",
        }
    }
}

/// Infantry flavor garrisoned by the bunker at a build-grid square.
///
/// The map arranges bunker flavors in fixed rings: Marine squares at
/// the edge, then Reaper, then Marauder, with the four Ghost squares
/// at the center.
#[must_use]
pub fn bunker_flavor(index: i64) -> &'static str {
    const MARINE: &[i64] = &[
        1, 2, 3, 4, 5, 6, 8, 15, 16, 23, 24, 31, 32, 39, 40, 47, 48, 55, 57, 58, 59, 60, 61, 62,
    ];
    const REAPER: &[i64] = &[
        9, 10, 11, 12, 13, 14, 17, 22, 25, 30, 33, 38, 41, 46, 49, 50, 51, 52, 53, 54,
    ];
    const MARAUDER: &[i64] = &[18, 19, 20, 21, 26, 29, 34, 37, 42, 43, 44, 45];
    const GHOST: &[i64] = &[27, 28, 35, 36];

    if MARINE.contains(&index) {
        "Marine"
    } else if REAPER.contains(&index) {
        "Reaper"
    } else if MARAUDER.contains(&index) {
        "Marauder"
    } else if GHOST.contains(&index) {
        "Ghost"
    } else {
        "Unknown"
    }
}

/// An immutable classified match event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchEvent {
    /// The event kind.
    pub kind: MatchEventKind,
    /// Stable string key, duplicated for flat consumers.
    pub key: &'static str,
    /// Generated human description.
    pub description: String,
    /// Owning player's profile id.
    pub profile_id: String,
    /// Opposing player's profile id, when any.
    pub opposing_profile_id: Option<String>,
    /// Gameloop the source event fired at.
    pub gameloop: u32,
    /// Seconds of game time.
    pub game_time: f64,
    /// Event value (the score delta for a nuke, zero otherwise).
    pub value: i64,
    /// Owner's total score when the event fired.
    pub total_score: i64,
    /// Owner's unspent minerals when the event fired.
    pub minerals_on_hand: i64,
    /// Snapshot of every active player at that instant.
    pub players: Vec<PlayerSnapshot>,
}

/// Builds a match event, or suppresses it when no owner resolves.
///
/// A nuke records its real owner in the killer field of the death
/// event; when only the opposing side resolves, it is promoted to
/// owner before the event is built.
#[must_use]
pub fn build_match_event(
    roster: &Roster,
    gameloop: u32,
    kind: MatchEventKind,
    description: String,
    owner: Option<PlayerId>,
    opponent: Option<PlayerId>,
    value: i64,
) -> Option<MatchEvent> {
    let mut owner = owner.and_then(|id| roster.get(id));
    let mut opponent = opponent.and_then(|id| roster.get(id));

    if owner.is_none() && opponent.is_some() {
        owner = opponent.take();
    }

    let Some(owner) = owner else {
        warn!(key = kind.key(), gameloop, "no owner for match event; suppressed");
        return None;
    };

    debug!(key = kind.key(), gameloop, owner = %owner.name, "match event");

    Some(MatchEvent {
        kind,
        key: kind.key(),
        description,
        profile_id: owner.profile_id.clone(),
        opposing_profile_id: opponent.map(|p| p.profile_id.clone()),
        gameloop,
        game_time: crate::protocol::events::game_time(gameloop),
        value,
        total_score: owner.stats.total_score(),
        minerals_on_hand: owner.stats.score.minerals_current,
        players: roster.snapshots(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::player::{Player, TeamId};

    fn roster() -> Roster {
        let mut a = Player::new(PlayerId(1));
        a.name = "Alpha".to_owned();
        a.profile_id = "1-S2-1-1".to_owned();
        a.team = Some(TeamId(0));
        a.position = Some(0);
        let mut b = Player::new(PlayerId(2));
        b.name = "Beta".to_owned();
        b.profile_id = "1-S2-1-2".to_owned();
        b.team = Some(TeamId(1));
        b.position = Some(2);
        Roster::new(vec![a, b])
    }

    #[test]
    fn test_kind_keys() {
        assert_eq!(MatchEventKind::BunkerKilled.key(), "bunker_killed");
        assert_eq!(MatchEventKind::PlayerSuicide.key(), "player_suicide");
    }

    #[test]
    fn test_kind_serializes_to_key() {
        let json = serde_json::to_string(&MatchEventKind::BunkerStarted).unwrap();
        assert_eq!(json, "\"bunker_started\"");
    }

    #[test]
    fn test_bunker_flavor_rings() {
        assert_eq!(bunker_flavor(1), "Marine");
        assert_eq!(bunker_flavor(62), "Marine");
        assert_eq!(bunker_flavor(9), "Reaper");
        assert_eq!(bunker_flavor(18), "Marauder");
        assert_eq!(bunker_flavor(27), "Ghost");
        assert_eq!(bunker_flavor(0), "Unknown");
        assert_eq!(bunker_flavor(63), "Unknown");
    }

    #[test]
    fn test_event_captures_owner_state() {
        let roster = roster();
        let event = build_match_event(
            &roster,
            224,
            MatchEventKind::BunkerKilled,
            "Beta destroys Alpha's Marine bunker.".to_owned(),
            Some(PlayerId(1)),
            Some(PlayerId(2)),
            0,
        )
        .unwrap();

        assert_eq!(event.profile_id, "1-S2-1-1");
        assert_eq!(event.opposing_profile_id.as_deref(), Some("1-S2-1-2"));
        assert_eq!(event.players.len(), 2);
        assert!((event.game_time - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_killer_promoted_to_owner() {
        let roster = roster();
        let event = build_match_event(
            &roster,
            0,
            MatchEventKind::PlayerNuked,
            "Beta nukes for a value of 500".to_owned(),
            None,
            Some(PlayerId(2)),
            500,
        )
        .unwrap();

        assert_eq!(event.profile_id, "1-S2-1-2");
        assert!(event.opposing_profile_id.is_none());
        assert_eq!(event.value, 500);
    }

    #[test]
    fn test_no_owner_suppressed() {
        let roster = roster();
        let event = build_match_event(
            &roster,
            0,
            MatchEventKind::BunkerStarted,
            "orphan".to_owned(),
            None,
            None,
            0,
        );
        assert!(event.is_none());
    }
}
