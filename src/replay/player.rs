//! Player, team, and statistics data model.
//!
//! Players live in a flat [`Roster`] arena indexed by [`PlayerId`].
//! Relations that would otherwise be cyclic (the lane partner) are
//! stored as ids into the arena, keeping O(1) symmetric lookup without
//! reference cycles. Teams are derived views over the roster rather
//! than owning structures: `eliminated` and `winner` are computed from
//! member state, never stored on a team.
//!
//! [`Stats`] tallies units per *observed* player key: a player's own
//! creations are keyed by themselves, while losses are keyed by the
//! killer and kills by the victim. That double-keying is what makes
//! per-opponent breakdowns ("feed") possible after the fact.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::protocol::events::{ChatRecipient, ScoreSnapshot};
use crate::protocol::PlayerColor;

/// Player-namespace id, the one unit events carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PlayerId(pub i64);

/// User-namespace id, the one message and game events carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UserId(pub i64);

/// Team id derived from spawn position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TeamId(pub i64);

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for TeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tally of one unit type under one observed player key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnitTally {
    /// Units whose construction was started.
    pub created: u32,
    /// Units lost to an opponent or a despawn.
    pub lost: u32,
    /// Opposing units destroyed.
    pub killed: u32,
    /// Own units cancelled before completion.
    pub cancelled: u32,
}

/// Tally category selector for [`Stats::increment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatCategory {
    /// Construction started.
    Created,
    /// Lost to an opponent or despawn.
    Lost,
    /// Opposing unit destroyed.
    Killed,
    /// Cancelled before completion.
    Cancelled,
}

/// Per-player unit statistics and latest score state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    /// Observed player key -> unit type -> tally.
    pub totals: BTreeMap<PlayerId, BTreeMap<String, UnitTally>>,
    /// The most recent stats-update sample.
    pub score: ScoreSnapshot,
}

impl Stats {
    /// Bumps one tally category under the given observed key.
    pub fn increment(&mut self, observed: PlayerId, unit: &str, category: StatCategory) {
        let tally = self
            .totals
            .entry(observed)
            .or_default()
            .entry(unit.to_owned())
            .or_default();
        match category {
            StatCategory::Created => tally.created += 1,
            StatCategory::Lost => tally.lost += 1,
            StatCategory::Killed => tally.killed += 1,
            StatCategory::Cancelled => tally.cancelled += 1,
        }
    }

    /// Removes one `created` credit under the given observed key.
    ///
    /// Used by ownership transfer; saturates at zero rather than
    /// underflowing on a malformed stream.
    pub fn revoke_created(&mut self, observed: PlayerId, unit: &str) {
        if let Some(tally) = self
            .totals
            .get_mut(&observed)
            .and_then(|units| units.get_mut(unit))
        {
            tally.created = tally.created.saturating_sub(1);
        }
    }

    /// Sums one unit type's tallies across all observed keys.
    #[must_use]
    pub fn tally_for(&self, unit: &str) -> UnitTally {
        let mut sum = UnitTally::default();
        for units in self.totals.values() {
            if let Some(tally) = units.get(unit) {
                sum.created += tally.created;
                sum.lost += tally.lost;
                sum.killed += tally.killed;
                sum.cancelled += tally.cancelled;
            }
        }
        sum
    }

    /// Bunker tally across all observed keys.
    #[must_use]
    pub fn bunkers(&self) -> UnitTally {
        self.tally_for(BUNKER_UNIT)
    }

    /// Total score from the latest stats sample.
    #[must_use]
    pub fn total_score(&self) -> i64 {
        self.score.total_score()
    }
}

/// The core defensive structure; losing the last one eliminates.
pub const BUNKER_UNIT: &str = "Bunker";
/// The siege unit announced as a match event.
pub const TANK_UNIT: &str = "Tank";
/// The nuke unit; scored on the stats update after it resolves.
pub const NUKE_UNIT: &str = "Nuke";

/// Award value of one killed unit, used for feed aggregation.
#[must_use]
pub fn unit_award(unit: &str) -> i64 {
    match unit {
        "SiegeBreakerSieged" => 750,
        "Bunker" => 650,
        "SensorTower" => 125,
        "AutoTurret" => 100,
        "SCV" => 35,
        "Spectre" | "SupplyDepot" => 20,
        "Ghost" | "MercReaper" => 15,
        "WarPig" | "Reaper" => 10,
        "Marine" => 5,
        _ => 0,
    }
}

/// One chat line attributed to a player.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatLine {
    /// Seconds of game time when sent.
    pub game_time: f64,
    /// Visibility scope.
    pub recipient: ChatRecipient,
    /// The message text.
    pub text: String,
}

/// One step of a player's upgrade timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpgradeStep {
    /// Seconds of game time when researched.
    pub game_time: f64,
    /// Upgrade catalog name.
    pub name: String,
    /// Running total for that upgrade after this step.
    pub total: i64,
    /// The player's total score at that moment.
    pub total_score: i64,
}

/// One match participant.
///
/// Constructed once by identity resolution before the event pass and
/// mutated in place by the state machine; never destroyed mid-parse.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    /// Player-namespace id.
    pub id: PlayerId,
    /// User-namespace id, when the chain resolved.
    pub user_id: Option<UserId>,
    /// Lobby slot id from the details list.
    pub slot_id: Option<i64>,
    /// Stable battle.net profile id.
    pub profile_id: String,
    /// Display name with any clan tag stripped.
    pub name: String,
    /// Team derived from spawn position.
    pub team: Option<TeamId>,
    /// Fixed spawn position index.
    pub position: Option<i64>,
    /// The mirrored-position partner, by id.
    pub lane: Option<PlayerId>,
    /// Lobby color.
    pub color: PlayerColor,
    /// Recorded result from the details list.
    pub result: Option<i64>,
    /// Unit statistics and latest score sample.
    pub stats: Stats,
    /// Upgrade name -> accumulated level count.
    pub upgrade_totals: BTreeMap<String, i64>,
    /// Upgrade research history in order.
    pub upgrade_timeline: Vec<UpgradeStep>,
    /// Departed without being killed.
    pub left_game: bool,
    /// Eliminated by an opponent (or self-cancel).
    pub eliminated: bool,
    /// 1-based order of elimination.
    pub victim_number: Option<u32>,
    /// Seconds of game time at elimination.
    pub eliminated_at: Option<f64>,
    /// Who eliminated this player, when anyone did.
    pub killer: Option<PlayerId>,
    /// Member of the last team standing.
    pub winner: bool,
    /// Gameloop of a nuke awaiting scoring on the next stats update.
    pub pending_nuke: Option<u32>,
    /// Messages sent to everyone.
    pub all_chats: Vec<ChatLine>,
    /// Messages sent to the team.
    pub allied_chats: Vec<ChatLine>,
}

impl Player {
    /// Creates a blank player for the given id.
    #[must_use]
    pub fn new(id: PlayerId) -> Self {
        Player {
            id,
            user_id: None,
            slot_id: None,
            profile_id: String::new(),
            name: String::new(),
            team: None,
            position: None,
            lane: None,
            color: PlayerColor::default(),
            result: None,
            stats: Stats::default(),
            upgrade_totals: BTreeMap::new(),
            upgrade_timeline: Vec::new(),
            left_game: false,
            eliminated: false,
            victim_number: None,
            eliminated_at: None,
            killer: None,
            winner: false,
            pending_nuke: None,
            all_chats: Vec::new(),
            allied_chats: Vec::new(),
        }
    }

    /// Out of the match, whether by leaving or by elimination.
    #[must_use]
    pub fn is_eliminated(&self) -> bool {
        self.left_game || self.eliminated
    }

    /// Whether no live bunkers remain (created minus cancelled minus
    /// lost).
    #[must_use]
    pub fn has_no_bunkers(&self) -> bool {
        let b = self.stats.bunkers();
        i64::from(b.created) - i64::from(b.cancelled) - i64::from(b.lost) == 0
    }

    /// Spectator or unresolved participant: no position or no team.
    #[must_use]
    pub fn is_observer(&self) -> bool {
        self.position.is_none() || self.team.is_none()
    }

    /// Captures the small immutable by-value record used in match
    /// events and segments.
    #[must_use]
    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            profile_id: self.profile_id.clone(),
            name: self.name.clone(),
            team: self.team,
            position: self.position,
            color: self.color,
            left_game: self.left_game,
            eliminated: self.eliminated,
            victim_number: self.victim_number,
            winner: self.winner,
            total_score: self.stats.total_score(),
            minerals_on_hand: self.stats.score.minerals_current,
            bunkers: self.stats.bunkers(),
        }
    }
}

/// Small immutable player state record captured at an instant.
///
/// Snapshot-by-value of the fields downstream consumers need; no
/// cloning of the full mutable graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    /// Stable battle.net profile id.
    pub profile_id: String,
    /// Display name.
    pub name: String,
    /// Team id.
    pub team: Option<TeamId>,
    /// Spawn position index.
    pub position: Option<i64>,
    /// Lobby color.
    pub color: PlayerColor,
    /// Departed without being killed.
    pub left_game: bool,
    /// Eliminated by an opponent.
    pub eliminated: bool,
    /// 1-based elimination order.
    pub victim_number: Option<u32>,
    /// Member of the winning team.
    pub winner: bool,
    /// Total score at capture time.
    pub total_score: i64,
    /// Unspent minerals at capture time.
    pub minerals_on_hand: i64,
    /// Bunker tally at capture time.
    pub bunkers: UnitTally,
}

/// Derived view of one team.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Team {
    /// Team id.
    pub id: TeamId,
    /// Member player ids in roster order.
    pub members: Vec<PlayerId>,
    /// All members out of the match.
    pub eliminated: bool,
    /// Any member marked winner.
    pub winner: bool,
}

/// Flat arena of all match participants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    players: Vec<Player>,
}

impl Roster {
    /// Builds a roster from resolved players.
    #[must_use]
    pub fn new(players: Vec<Player>) -> Self {
        Roster { players }
    }

    /// All players including observers.
    #[must_use]
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Active (non-observer) players in roster order.
    pub fn active(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| !p.is_observer())
    }

    /// Looks up a player by player-namespace id.
    #[must_use]
    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Mutable lookup by player-namespace id.
    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// Looks up an active player by user-namespace id.
    #[must_use]
    pub fn by_user(&self, user: UserId) -> Option<&Player> {
        self.active().find(|p| p.user_id == Some(user))
    }

    /// Mutable lookup of an active player by user-namespace id.
    pub fn by_user_mut(&mut self, user: UserId) -> Option<&mut Player> {
        self.players
            .iter_mut()
            .filter(|p| !p.is_observer())
            .find(|p| p.user_id == Some(user))
    }

    /// Count of active players already out of the match.
    #[must_use]
    pub fn eliminated_count(&self) -> usize {
        self.active().filter(|p| p.is_eliminated()).count()
    }

    /// Derived team views, ordered by team id.
    #[must_use]
    pub fn teams(&self) -> Vec<Team> {
        let mut by_id: BTreeMap<TeamId, Vec<PlayerId>> = BTreeMap::new();
        for player in self.active() {
            if let Some(team) = player.team {
                by_id.entry(team).or_default().push(player.id);
            }
        }
        by_id
            .into_iter()
            .map(|(id, members)| {
                let states: Vec<&Player> =
                    members.iter().filter_map(|&m| self.get(m)).collect();
                Team {
                    id,
                    eliminated: states.iter().all(|p| p.is_eliminated()),
                    winner: states.iter().any(|p| p.winner),
                    members,
                }
            })
            .collect()
    }

    /// Count of teams that started the match.
    #[must_use]
    pub fn team_count(&self) -> usize {
        self.teams().len()
    }

    /// Count of teams not yet eliminated.
    #[must_use]
    pub fn teams_remaining(&self) -> usize {
        self.teams().iter().filter(|t| !t.eliminated).count()
    }

    /// The winning team, when one exists.
    #[must_use]
    pub fn winning_team(&self) -> Option<Team> {
        self.teams().into_iter().find(|t| t.winner)
    }

    /// Snapshots all active players.
    #[must_use]
    pub fn snapshots(&self) -> Vec<PlayerSnapshot> {
        self.active().map(Player::snapshot).collect()
    }

    /// Award-weighted kill totals per opposing player name.
    ///
    /// Sums `killed x award value` under each observed key of the
    /// given player's stats, giving who they farmed their score from.
    #[must_use]
    pub fn feed(&self, id: PlayerId) -> BTreeMap<String, i64> {
        let mut result = BTreeMap::new();
        let Some(player) = self.get(id) else {
            return result;
        };
        for (observed, units) in &player.stats.totals {
            let Some(opponent) = self.get(*observed) else {
                continue;
            };
            let award: i64 = units
                .iter()
                .map(|(unit, tally)| i64::from(tally.killed) * unit_award(unit))
                .sum();
            result.insert(opponent.name.clone(), award);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: i64, team: i64, position: i64) -> Player {
        let mut p = Player::new(PlayerId(id));
        p.name = format!("Player{id}");
        p.profile_id = format!("1-S2-1-{id}");
        p.team = Some(TeamId(team));
        p.position = Some(position);
        p
    }

    #[test]
    fn test_stats_increment_and_sum() {
        let mut stats = Stats::default();
        let me = PlayerId(1);
        let foe = PlayerId(2);
        stats.increment(me, "Bunker", StatCategory::Created);
        stats.increment(me, "Bunker", StatCategory::Created);
        stats.increment(foe, "Bunker", StatCategory::Lost);

        let bunkers = stats.bunkers();
        assert_eq!(bunkers.created, 2);
        assert_eq!(bunkers.lost, 1);
        assert_eq!(bunkers.killed, 0);
    }

    #[test]
    fn test_has_no_bunkers() {
        let mut p = player(1, 0, 0);
        assert!(p.has_no_bunkers());
        p.stats.increment(PlayerId(1), "Bunker", StatCategory::Created);
        assert!(!p.has_no_bunkers());
        p.stats.increment(PlayerId(2), "Bunker", StatCategory::Lost);
        assert!(p.has_no_bunkers());
    }

    #[test]
    fn test_revoke_created_saturates() {
        let mut stats = Stats::default();
        stats.revoke_created(PlayerId(1), "Bunker");
        assert_eq!(stats.bunkers().created, 0);

        stats.increment(PlayerId(1), "Bunker", StatCategory::Created);
        stats.revoke_created(PlayerId(1), "Bunker");
        assert_eq!(stats.bunkers().created, 0);
    }

    #[test]
    fn test_observer_detection() {
        let mut p = Player::new(PlayerId(9));
        assert!(p.is_observer());
        p.position = Some(3);
        assert!(p.is_observer());
        p.team = Some(TeamId(1));
        assert!(!p.is_observer());
    }

    #[test]
    fn test_roster_teams_derived() {
        let mut a = player(1, 0, 0);
        let b = player(2, 0, 1);
        let c = player(3, 1, 2);
        a.eliminated = true;

        let roster = Roster::new(vec![a, b, c]);
        let teams = roster.teams();
        assert_eq!(teams.len(), 2);
        assert!(!teams[0].eliminated); // one member still alive
        assert_eq!(roster.teams_remaining(), 2);
    }

    #[test]
    fn test_team_eliminated_when_all_members_out() {
        let mut a = player(1, 0, 0);
        let mut b = player(2, 0, 1);
        a.eliminated = true;
        b.left_game = true;

        let roster = Roster::new(vec![a, b, player(3, 1, 2)]);
        assert_eq!(roster.teams_remaining(), 1);
    }

    #[test]
    fn test_winning_team_from_member_flag() {
        let mut a = player(1, 0, 0);
        a.winner = true;
        let roster = Roster::new(vec![a, player(2, 1, 2)]);
        assert_eq!(roster.winning_team().map(|t| t.id), Some(TeamId(0)));
    }

    #[test]
    fn test_feed_awards() {
        let mut a = player(1, 0, 0);
        let b = player(2, 1, 2);
        // a killed two of b's marines and one bunker
        a.stats.increment(PlayerId(2), "Marine", StatCategory::Killed);
        a.stats.increment(PlayerId(2), "Marine", StatCategory::Killed);
        a.stats.increment(PlayerId(2), "Bunker", StatCategory::Killed);

        let roster = Roster::new(vec![a, b]);
        let feed = roster.feed(PlayerId(1));
        assert_eq!(feed.get("Player2"), Some(&(2 * 5 + 650)));
    }

    #[test]
    fn test_unit_award_table() {
        assert_eq!(unit_award("SiegeBreakerSieged"), 750);
        assert_eq!(unit_award("Bunker"), 650);
        assert_eq!(unit_award("MineralCrystal"), 0);
        assert_eq!(unit_award("SomethingNew"), 0);
    }

    #[test]
    fn test_snapshot_captures_state() {
        let mut p = player(4, 1, 3);
        p.stats.increment(PlayerId(4), "Bunker", StatCategory::Created);
        p.victim_number = Some(2);
        p.eliminated = true;

        let snap = p.snapshot();
        assert_eq!(snap.bunkers.created, 1);
        assert_eq!(snap.victim_number, Some(2));
        assert!(snap.eliminated);

        // later mutation does not affect the captured value
        p.stats.increment(PlayerId(4), "Bunker", StatCategory::Created);
        assert_eq!(snap.bunkers.created, 1);
    }
}
