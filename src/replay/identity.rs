//! Identity resolution across the replay's id namespaces.
//!
//! The sub-streams name participants differently: the details list
//! only carries a working-set slot id, lobby slots map slots to user
//! ids, and unit events carry player ids. The chain is resolved as
//! slot -> user (init-data), user -> player (the leading run of
//! player-setup tracker events), player -> spawn position (the
//! loop-zero bunker births), and position -> team / lane partner via
//! fixed tables for the map's twelve spawns.
//!
//! Spawn positions come from starting bunker placement rather than
//! lobby state because the map randomizes spawns after the lobby.
//!
//! A player whose chain cannot be completed is logged and left out of
//! team and lane assignment; resolution is never fatal for the parse.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::Result;
use crate::protocol::events::{grid_index, TrackerEvent, TrackerEventKind};
use crate::protocol::{Details, InitData};
use crate::replay::player::{Player, PlayerId, Roster, TeamId, UserId, BUNKER_UNIT};

/// Team for a spawn position; two lane positions plus one corner
/// position per team.
fn team_for_position(position: i64) -> Option<TeamId> {
    match position {
        0 | 1 | 8 => Some(TeamId(0)),
        2 | 3 | 9 => Some(TeamId(1)),
        4 | 5 | 10 => Some(TeamId(2)),
        6 | 7 | 11 => Some(TeamId(3)),
        _ => None,
    }
}

/// Mirrored lane position for a spawn position.
fn lane_for_position(position: i64) -> Option<i64> {
    match position {
        0 => Some(7),
        1 => Some(2),
        2 => Some(1),
        3 => Some(4),
        4 => Some(3),
        5 => Some(6),
        6 => Some(5),
        7 => Some(0),
        _ => None,
    }
}

/// Spawn position for a starting bunker's build-grid index.
///
/// The grid index counts build squares left to right, top to bottom;
/// the twelve starting bunkers sit at fixed squares around the map
/// edge.
fn position_for_start_index(index: i64) -> Option<i64> {
    match index {
        8 => Some(0),
        1 => Some(1),
        6 => Some(2),
        15 => Some(3),
        55 => Some(4),
        62 => Some(5),
        57 => Some(6),
        48 => Some(7),
        9 => Some(8),
        14 => Some(9),
        54 => Some(10),
        49 => Some(11),
        _ => None,
    }
}

/// Drops a leading `&lt;TAG<sp/>` clan prefix from a display name.
fn strip_clan_tag(name: &str) -> String {
    match (name.find("&lt;"), name.rfind("<sp/>")) {
        (Some(start), Some(end)) if end >= start => {
            let mut out = String::with_capacity(name.len());
            out.push_str(&name[..start]);
            out.push_str(&name[end + "<sp/>".len()..]);
            out
        }
        _ => name.to_owned(),
    }
}

/// Resolves the full identity chain into a [`Roster`].
///
/// Consumes only the pre-game prefix of the tracker stream: the
/// contiguous leading run of player-setup events and the loop-zero
/// bunker births. The iterator may be a fresh decode pass; nothing
/// past gameloop zero is read.
///
/// # Errors
///
/// Returns a decode error from the tracker prefix; unresolvable
/// players are logged and skipped, never an error.
pub fn resolve_roster<I>(details: &Details, init_data: &InitData, events: I) -> Result<Roster>
where
    I: IntoIterator<Item = Result<TrackerEvent>>,
{
    let mut user_to_player: HashMap<i64, i64> = HashMap::new();
    let mut player_to_position: HashMap<i64, i64> = HashMap::new();

    let mut setups_started = false;
    let mut setups_done = false;
    for event in events {
        let event = event?;
        if event.gameloop > 0 {
            break;
        }
        match &event.kind {
            TrackerEventKind::PlayerSetup {
                player_id, user_id, ..
            } if !setups_done => {
                setups_started = true;
                if let Some(user) = user_id {
                    user_to_player.insert(*user, *player_id);
                }
            }
            TrackerEventKind::UnitBorn {
                unit_type,
                control_player_id,
                x,
                y,
                ..
            } if unit_type == BUNKER_UNIT => {
                if setups_started {
                    setups_done = true;
                }
                let start_index = grid_index(*x as f64, *y as f64);
                if let Some(position) = position_for_start_index(start_index) {
                    player_to_position.insert(*control_player_id, position);
                } else {
                    debug!(start_index, "starting bunker at unmapped grid square");
                }
            }
            _ => {
                if setups_started {
                    setups_done = true;
                }
            }
        }
    }

    // slot -> user from the lobby slot list
    let slot_to_user: HashMap<i64, i64> = init_data
        .slots
        .iter()
        .filter_map(|slot| {
            slot.working_set_slot_id
                .zip(slot.user_id)
        })
        .collect();

    let mut players: Vec<Player> = Vec::new();
    for entry in &details.players {
        let user_id = entry
            .working_set_slot_id
            .and_then(|slot| slot_to_user.get(&slot).copied());
        let player_id = user_id.and_then(|user| user_to_player.get(&user).copied());

        let Some(player_id) = player_id else {
            warn!(name = %entry.name, "could not resolve a player id; skipping");
            continue;
        };

        let mut player = Player::new(PlayerId(player_id));
        player.name = strip_clan_tag(&entry.name);
        player.profile_id = entry.profile_id.clone();
        player.slot_id = entry.working_set_slot_id;
        player.user_id = user_id.map(UserId);
        player.color = entry.color;
        player.result = entry.result;
        player.position = player_to_position.get(&player_id).copied();
        player.team = player.position.and_then(team_for_position);
        players.push(player);
    }

    // lane partners, both directions in one pass
    for i in 0..players.len() {
        let Some(lane_pos) = players[i].position.and_then(lane_for_position) else {
            continue;
        };
        if let Some(j) = players.iter().position(|p| p.position == Some(lane_pos)) {
            let (a, b) = (players[i].id, players[j].id);
            players[i].lane = Some(b);
            players[j].lane = Some(a);
        }
    }

    Ok(Roster::new(players))
}
