//! The single-pass match state machine.
//!
//! [`MatchState::apply_tracker`] consumes tracker events in causal
//! order and mutates the roster, the unit tracker, and the segment
//! recorder; each call returns the side effects it produced as
//! [`StreamPayload`] items so a streaming consumer can forward them
//! incrementally while a batch consumer just collects them. Message
//! events are applied through [`MatchState::apply_message`], merged by
//! gameloop by the stream driver.
//!
//! All handlers recover locally from unresolvable identities: the
//! offending event's effect is logged and skipped, never fatal.

use tracing::{debug, warn};

use crate::protocol::events::{
    game_time, grid_index, MessageEvent, MessageEventKind, ScoreSnapshot, TrackerEvent,
    TrackerEventKind, UnitTag,
};
use crate::replay::classify::{build_match_event, bunker_flavor, MatchEvent, MatchEventKind};
use crate::replay::player::{
    ChatLine, PlayerId, Roster, StatCategory, UpgradeStep, UserId, BUNKER_UNIT, NUKE_UNIT,
    TANK_UNIT,
};
use crate::replay::segments::{SegmentCapture, SegmentKind, SegmentRecorder};
use crate::replay::units::UnitTracker;

/// Upgrades with this prefix are cosmetic skins, not research.
const REWARD_UPGRADE_PREFIX: &str = "Reward";

/// One side effect emitted by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPayload {
    /// A classified match event.
    Match(MatchEvent),
    /// A milestone snapshot was captured.
    Segment {
        /// Which milestone.
        kind: SegmentKind,
        /// The capture.
        capture: SegmentCapture,
    },
    /// A player's upgrade total advanced.
    Upgrade {
        /// The researching player.
        player: PlayerId,
        /// Upgrade catalog name.
        upgrade: String,
        /// Running total after this step.
        total: i64,
    },
    /// A chat line was attributed.
    Chat {
        /// The sending player.
        player: PlayerId,
        /// The attributed line.
        line: ChatLine,
    },
}

/// Mutable aggregate state for one match pass.
#[derive(Debug, Clone)]
pub struct MatchState {
    roster: Roster,
    units: UnitTracker,
    segments: SegmentRecorder,
}

impl MatchState {
    /// Starts a pass over a freshly resolved roster.
    #[must_use]
    pub fn new(roster: Roster) -> Self {
        MatchState {
            roster,
            units: UnitTracker::new(),
            segments: SegmentRecorder::new(),
        }
    }

    /// The current roster.
    #[must_use]
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// The segment recorder.
    #[must_use]
    pub fn segments(&self) -> &SegmentRecorder {
        &self.segments
    }

    /// Consumes the state at end of pass.
    #[must_use]
    pub fn into_parts(self) -> (Roster, SegmentRecorder) {
        (self.roster, self.segments)
    }

    /// Applies one tracker event and returns its side effects.
    pub fn apply_tracker(&mut self, event: &TrackerEvent) -> Vec<StreamPayload> {
        let mut out = Vec::new();
        match &event.kind {
            TrackerEventKind::UnitOwnerChange {
                tag,
                control_player_id,
                ..
            } => self.on_transfer(event.gameloop, *tag, *control_player_id, &mut out),
            TrackerEventKind::PlayerStats { player_id, stats } => {
                self.on_stats(event.gameloop, *player_id, *stats, &mut out);
            }
            TrackerEventKind::Upgrade {
                player_id,
                upgrade,
                count,
            } => self.on_upgrade(event.gameloop, *player_id, upgrade, *count, &mut out),
            TrackerEventKind::UnitBorn {
                tag,
                unit_type,
                control_player_id,
                x,
                y,
                ..
            }
            | TrackerEventKind::UnitInit {
                tag,
                unit_type,
                control_player_id,
                x,
                y,
                ..
            } => {
                self.units.add(*tag, unit_type, *control_player_id);
                self.on_unit_started(
                    event.gameloop,
                    unit_type,
                    *control_player_id,
                    *x,
                    *y,
                    &mut out,
                );
            }
            TrackerEventKind::UnitDied {
                tag,
                killer_player_id,
                x,
                y,
                ..
            } => self.on_unit_died(event.gameloop, *tag, *killer_player_id, *x, *y, &mut out),
            TrackerEventKind::UnitTypeChange { tag, unit_type } => {
                self.units.set_type(*tag, unit_type);
            }
            TrackerEventKind::PlayerSetup { .. }
            | TrackerEventKind::UnitDone { .. }
            | TrackerEventKind::Unknown { .. } => {}
        }

        for (kind, capture) in self.segments.check(event.gameloop, &self.roster) {
            out.push(StreamPayload::Segment { kind, capture });
        }
        out
    }

    /// Applies one message event and returns its side effects.
    ///
    /// Only chat is attributed; a sender outside the active roster
    /// (observer or unresolved identity) is dropped silently.
    pub fn apply_message(&mut self, event: &MessageEvent) -> Vec<StreamPayload> {
        let MessageEventKind::Chat { recipient, text } = &event.kind else {
            return Vec::new();
        };
        let Some(player) = self.roster.by_user_mut(UserId(event.user_id)) else {
            debug!(user_id = event.user_id, "chat from unresolved sender dropped");
            return Vec::new();
        };

        let line = ChatLine {
            game_time: game_time(event.gameloop),
            recipient: *recipient,
            text: text.clone(),
        };
        if matches!(recipient, crate::protocol::events::ChatRecipient::All) {
            player.all_chats.push(line.clone());
        } else {
            player.allied_chats.push(line.clone());
        }
        vec![StreamPayload::Chat {
            player: player.id,
            line,
        }]
    }

    /// Ownership transfer: move creation credit, re-point the unit,
    /// and check the old owner for a no-kill departure.
    fn on_transfer(
        &mut self,
        gameloop: u32,
        tag: UnitTag,
        new_control_id: i64,
        out: &mut Vec<StreamPayload>,
    ) {
        let Some(record) = self.units.get(tag) else {
            debug!(gameloop, "transfer of untracked unit ignored");
            return;
        };
        let unit_type = record.unit_type.clone();
        let old_owner_id = record.owner();
        let new_owner_id = PlayerId(new_control_id);

        if self.roster.get(old_owner_id).is_none() {
            warn!(%old_owner_id, unit = %unit_type, "transfer from unresolved owner");
            return;
        }

        if let Some(old) = self.roster.get_mut(old_owner_id) {
            old.stats.revoke_created(old_owner_id, &unit_type);
        }
        if let Some(new) = self.roster.get_mut(new_owner_id) {
            new.stats.increment(new_owner_id, &unit_type, StatCategory::Created);
        }
        self.units.set_owner(tag, new_control_id);
        debug!(unit = %unit_type, %old_owner_id, %new_owner_id, "unit transferred");

        let departed = self
            .roster
            .get(old_owner_id)
            .is_some_and(|p| p.has_no_bunkers() && !p.is_eliminated());
        if departed {
            self.eliminate(gameloop, old_owner_id, None, out);
        }
    }

    /// Stats update: score any pending nuke by the delta, then store
    /// the sample as the player's latest score state.
    fn on_stats(
        &mut self,
        _gameloop: u32,
        raw_player_id: i64,
        stats: ScoreSnapshot,
        out: &mut Vec<StreamPayload>,
    ) {
        let id = PlayerId(raw_player_id);
        let Some(player) = self.roster.get(id) else {
            debug!(player_id = raw_player_id, "stats update for unresolved player skipped");
            return;
        };

        if let Some(nuke_loop) = player.pending_nuke {
            let value = stats.total_score() - player.stats.total_score();
            let description = format!("{} nukes for a value of {value}", player.name);
            if let Some(event) = build_match_event(
                &self.roster,
                nuke_loop,
                MatchEventKind::PlayerNuked,
                description,
                Some(id),
                None,
                value,
            ) {
                out.push(StreamPayload::Match(event));
            }
        }

        if let Some(player) = self.roster.get_mut(id) {
            player.pending_nuke = None;
            player.stats.score = stats;
        }
    }

    /// Upgrade research: accumulate totals, ignoring reward skins.
    fn on_upgrade(
        &mut self,
        gameloop: u32,
        raw_player_id: i64,
        upgrade: &str,
        count: i64,
        out: &mut Vec<StreamPayload>,
    ) {
        if upgrade.starts_with(REWARD_UPGRADE_PREFIX) {
            return;
        }
        // reward skins aside, these can still fire for observers
        let Some(player) = self.roster.get_mut(PlayerId(raw_player_id)) else {
            return;
        };

        let total = player
            .upgrade_totals
            .entry(upgrade.to_owned())
            .and_modify(|t| *t += count)
            .or_insert(count);
        let total = *total;
        let step = UpgradeStep {
            game_time: game_time(gameloop),
            name: upgrade.to_owned(),
            total,
            total_score: player.stats.total_score(),
        };
        let id = player.id;
        player.upgrade_timeline.push(step);
        out.push(StreamPayload::Upgrade {
            player: id,
            upgrade: upgrade.to_owned(),
            total,
        });
    }

    /// Unit construction start: count it and announce bunkers and
    /// tanks.
    fn on_unit_started(
        &mut self,
        gameloop: u32,
        unit_type: &str,
        control_player_id: i64,
        x: i64,
        y: i64,
        out: &mut Vec<StreamPayload>,
    ) {
        let id = PlayerId(control_player_id);
        let Some(player) = self.roster.get_mut(id) else {
            // commonly neutral mineral spawns with no player attached
            debug!(unit = %unit_type, "unit start without resolvable player");
            return;
        };
        player.stats.increment(id, unit_type, StatCategory::Created);
        let name = player.name.clone();

        if unit_type == BUNKER_UNIT && gameloop != 0 {
            let flavor = bunker_flavor(grid_index(x as f64, y as f64));
            let description = format!("{name} Builds a {flavor} Bunker");
            if let Some(event) = build_match_event(
                &self.roster,
                gameloop,
                MatchEventKind::BunkerStarted,
                description,
                Some(id),
                None,
                0,
            ) {
                out.push(StreamPayload::Match(event));
            }
        } else if unit_type == TANK_UNIT {
            let description = format!("{name} Builds a Tank");
            if let Some(event) = build_match_event(
                &self.roster,
                gameloop,
                MatchEventKind::TankStarted,
                description,
                Some(id),
                None,
                0,
            ) {
                out.push(StreamPayload::Match(event));
            }
        }
    }

    /// Unit death: split tallies across owner and killer, announce
    /// bunker outcomes, re-check elimination, and stage nukes.
    fn on_unit_died(
        &mut self,
        gameloop: u32,
        tag: UnitTag,
        killer_player_id: Option<i64>,
        x: i64,
        y: i64,
        out: &mut Vec<StreamPayload>,
    ) {
        let Some(record) = self.units.get(tag) else {
            // pre-game decoration and mineral spawns are not tracked
            return;
        };
        let unit_type = record.unit_type.clone();
        let owner_id = record.owner();
        let owner_resolved = self.roster.get(owner_id).is_some();
        let killer_id = killer_player_id.map(PlayerId);
        let killer_resolved =
            killer_id.is_some_and(|k| self.roster.get(k).is_some());

        match (owner_resolved, killer_resolved) {
            (false, _) => {
                debug!(unit = %unit_type, "death of unit with no resolvable owner");
            }
            (true, true) => {
                let killer_id = killer_id.unwrap_or(owner_id);
                if killer_id == owner_id {
                    // an init cancel arrives as a self-kill
                    if let Some(owner) = self.roster.get_mut(owner_id) {
                        owner.stats.increment(owner_id, &unit_type, StatCategory::Cancelled);
                    }
                } else {
                    if let Some(owner) = self.roster.get_mut(owner_id) {
                        owner.stats.increment(killer_id, &unit_type, StatCategory::Lost);
                    }
                    if let Some(killer) = self.roster.get_mut(killer_id) {
                        killer.stats.increment(owner_id, &unit_type, StatCategory::Killed);
                    }
                }
            }
            (true, false) => {
                // a map despawn, or a departure with nobody to credit
                if let Some(owner) = self.roster.get_mut(owner_id) {
                    owner.stats.increment(owner_id, &unit_type, StatCategory::Lost);
                }
                let recorded_killer = self
                    .roster
                    .get(owner_id)
                    .filter(|p| p.is_eliminated())
                    .and_then(|p| p.killer)
                    .filter(|&k| k != owner_id);
                if let Some(recorded) = recorded_killer {
                    // despawn of an already-eliminated player's unit:
                    // the kill belongs to whoever eliminated them
                    if let Some(killer) = self.roster.get_mut(recorded) {
                        killer.stats.increment(owner_id, &unit_type, StatCategory::Killed);
                    }
                }
                debug!(unit = %unit_type, %owner_id, "unit died with no killer");
            }
        }

        if unit_type == BUNKER_UNIT {
            if let Some(killer_id) = killer_id.filter(|_| killer_resolved) {
                let flavor = bunker_flavor(grid_index(x as f64, y as f64));
                let event = if killer_id == owner_id {
                    let name = self.player_name(owner_id);
                    build_match_event(
                        &self.roster,
                        gameloop,
                        MatchEventKind::BunkerCancelled,
                        format!("{name} cancels their {flavor} bunker"),
                        Some(owner_id),
                        None,
                        0,
                    )
                } else if owner_resolved {
                    let killer_name = self.player_name(killer_id);
                    let owner_name = self.player_name(owner_id);
                    build_match_event(
                        &self.roster,
                        gameloop,
                        MatchEventKind::BunkerKilled,
                        format!("{killer_name} destroys {owner_name}'s {flavor} bunker."),
                        Some(owner_id),
                        Some(killer_id),
                        0,
                    )
                } else {
                    // generally a nuke kill on a neutral bunker; there
                    // is nobody to report it against
                    warn!(%killer_id, gameloop, "bunker kill with no resolvable owner; suppressed");
                    None
                };
                if let Some(event) = event {
                    out.push(StreamPayload::Match(event));
                }
            }

            if owner_resolved {
                let should_eliminate = self
                    .roster
                    .get(owner_id)
                    .is_some_and(|p| !p.winner && p.has_no_bunkers() && !p.is_eliminated());
                if should_eliminate {
                    self.eliminate(
                        gameloop,
                        owner_id,
                        killer_id.filter(|_| killer_resolved),
                        out,
                    );
                }
            }
        }

        if unit_type == NUKE_UNIT {
            // a nuke dying is it resolving; score arrives with the
            // next stats update. An eliminated owner forfeited it.
            let stage = self
                .roster
                .get(owner_id)
                .is_some_and(|p| !p.eliminated);
            if stage {
                if let Some(owner) = self.roster.get_mut(owner_id) {
                    owner.pending_nuke = Some(gameloop);
                }
            } else {
                debug!(%owner_id, "nuke from eliminated or unresolved owner ignored");
            }
        }

        self.units.remove(tag);
    }

    /// Marks a player out of the match and promotes a winner when one
    /// team remains.
    fn eliminate(
        &mut self,
        gameloop: u32,
        victim_id: PlayerId,
        killer_id: Option<PlayerId>,
        out: &mut Vec<StreamPayload>,
    ) {
        let victim_number = self.roster.eliminated_count() as u32 + 1;
        let Some(victim) = self.roster.get_mut(victim_id) else {
            return;
        };
        victim.victim_number = Some(victim_number);
        victim.left_game = killer_id.is_none();
        victim.eliminated = !victim.left_game;
        victim.killer = killer_id;
        victim.eliminated_at = Some(game_time(gameloop));
        let victim_name = victim.name.clone();
        let already_won = victim.winner;

        let (kind, description) = match killer_id {
            None => (
                MatchEventKind::PlayerLeave,
                format!("{victim_name} has left the game."),
            ),
            Some(k) if k == victim_id => (
                MatchEventKind::PlayerSuicide,
                format!("{victim_name} cancels their last bunker."),
            ),
            Some(k) => (
                MatchEventKind::PlayerDied,
                format!("{victim_name} was eliminated by {}", self.player_name(k)),
            ),
        };

        // a winner despawning at game end makes no event
        if !already_won {
            if let Some(event) = build_match_event(
                &self.roster,
                gameloop,
                kind,
                description,
                Some(victim_id),
                killer_id,
                0,
            ) {
                out.push(StreamPayload::Match(event));
            }
        }

        let remaining: Vec<_> = self
            .roster
            .teams()
            .into_iter()
            .filter(|t| !t.eliminated)
            .collect();
        if let [last] = remaining.as_slice() {
            for member in last.members.clone() {
                if let Some(player) = self.roster.get_mut(member) {
                    if !player.left_game {
                        player.winner = true;
                    }
                }
            }
        }
    }

    fn player_name(&self, id: PlayerId) -> String {
        self.roster
            .get(id)
            .map_or_else(String::new, |p| p.name.clone())
    }
}
