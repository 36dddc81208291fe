//! High-level replay parsing: open, stream, or parse in full.
//!
//! [`Replay::open`] validates the container and selects a protocol but
//! decodes no event streams. From there, [`Replay::stream`] gives
//! incremental event-by-event parsing, and [`Replay::parse`] drives
//! the same stream to completion and returns a [`ParsedMatch`]. Batch
//! is a thin layer over streaming, so both produce identical state.

pub mod classify;
pub mod identity;
pub mod player;
pub mod segments;
pub mod state;
pub mod stream;
pub mod units;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::archive::{self, GameMetadata, MpqArchive};
use crate::error::{ParserError, Result};
use crate::protocol::events::{AttributeEvents, GameEventKind};
use crate::protocol::{
    decode_replay_header, Details, PlayerColor, Protocol, ReplayHeader, RESULT_WIN,
};
use classify::MatchEvent;
use player::{ChatLine, Roster, TeamId, UnitTally};
use segments::{SegmentCapture, SegmentKind};
use state::{MatchState, StreamPayload};
use stream::ReplayStream;

/// Map titles this parser accepts.
const EXPECTED_TITLES: [&str; 2] = ["Zone Control CE", "Zone Control CE Dev"];

/// Quick container-level facts, available without decoding any event
/// stream.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayInfo {
    /// Map title from the embedded metadata.
    pub title: String,
    /// Human-readable game version, when recorded.
    pub game_version: Option<String>,
    /// Base build from the replay header.
    pub base_build: u32,
    /// Protocol build the parser will decode with.
    pub protocol_build: u32,
    /// Match duration in gameloops, from the header.
    pub elapsed_game_loops: u32,
    /// Match duration in seconds, from the metadata when recorded.
    pub duration: Option<u32>,
    /// Named archive entries present.
    pub entries: Vec<&'static str>,
}

/// An opened and validated replay, ready to stream or parse.
pub struct Replay<'a> {
    archive: MpqArchive<'a>,
    header: ReplayHeader,
    metadata: GameMetadata,
    details: Details,
    protocol: Protocol,
}

impl<'a> Replay<'a> {
    /// Opens a replay over raw `.SC2Replay` bytes.
    ///
    /// Validates the archive, checks the map title, decodes the
    /// details for the completeness gate, and selects a protocol.
    ///
    /// # Errors
    ///
    /// - archive errors from [`MpqArchive::open`]
    /// - `ParserError::NotExpectedFormat` when the map title is not a
    ///   Zone Control CE variant
    /// - `ParserError::IncompleteMatch` when no player result records
    ///   a win
    /// - `ParserError::ProtocolUnavailable` when the build falls
    ///   outside every known bracket
    pub fn open(data: &'a [u8]) -> Result<Replay<'a>> {
        let archive = MpqArchive::open(data)?;
        let metadata = archive.metadata()?;
        if !EXPECTED_TITLES.contains(&metadata.title.as_str()) {
            return Err(ParserError::NotExpectedFormat {
                reason: format!("title was '{}'", metadata.title),
            });
        }

        let header = decode_replay_header(&archive.user_data().content)?;
        let protocol = Protocol::select(header.base_build).ok_or_else(|| {
            let (lower, upper) = Protocol::closest(header.base_build);
            ParserError::ProtocolUnavailable {
                build: header.base_build,
                tried: lower.into_iter().chain(upper).collect(),
            }
        })?;

        let details = protocol.decode_details(&archive.read_file(archive::DETAILS)?)?;
        if !details.players.iter().any(|p| p.result == Some(RESULT_WIN)) {
            return Err(ParserError::IncompleteMatch {
                reason: "no winning result in player list".to_owned(),
            });
        }

        info!(
            title = %metadata.title,
            base_build = header.base_build,
            protocol_build = protocol.base_build(),
            "replay opened"
        );
        Ok(Replay {
            archive,
            header,
            metadata,
            details,
            protocol,
        })
    }

    /// Container-level facts without decoding any event stream.
    #[must_use]
    pub fn info(&self) -> ReplayInfo {
        ReplayInfo {
            title: self.metadata.title.clone(),
            game_version: self.metadata.game_version.clone(),
            base_build: self.header.base_build,
            protocol_build: self.protocol.base_build(),
            elapsed_game_loops: self.header.elapsed_game_loops,
            duration: self.metadata.duration,
            entries: self.archive.present_entries(),
        }
    }

    /// The decoded replay header.
    #[must_use]
    pub fn header(&self) -> &ReplayHeader {
        &self.header
    }

    /// The decoded details sub-stream.
    #[must_use]
    pub fn details(&self) -> &Details {
        &self.details
    }

    /// The protocol selected at open.
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// The Battle.net game id: the first sync-loading-time sample.
    ///
    /// # Errors
    ///
    /// Returns any decode error from the game event stream.
    pub fn game_id(&self) -> Result<Option<i64>> {
        let data = self.archive.read_file(archive::GAME_EVENTS)?;
        Ok(self
            .protocol
            .game_events(&data)?
            .into_iter()
            .find_map(|e| match e.kind {
                GameEventKind::SyncLoadingTime { sync_time } => Some(sync_time),
                GameEventKind::Other { .. } => None,
            }))
    }

    /// Decodes the raw lobby attribute records.
    ///
    /// # Errors
    ///
    /// Returns any decode error from the attribute stream.
    pub fn attribute_events(&self) -> Result<AttributeEvents> {
        let data = self.archive.read_file(archive::ATTRIBUTE_EVENTS)?;
        crate::protocol::events::decode_attribute_events(&data)
    }

    /// Resolves the roster and returns an incremental event stream.
    ///
    /// # Errors
    ///
    /// Returns archive and decode errors from the entries identity
    /// resolution needs.
    pub fn stream(&self) -> Result<ReplayStream> {
        self.stream_with(self.protocol)
    }

    /// Like [`Replay::stream`] but decoding with an explicit protocol,
    /// for retrying a bracket substitute.
    ///
    /// # Errors
    ///
    /// Returns archive and decode errors from the entries identity
    /// resolution needs.
    pub fn stream_with(&self, protocol: Protocol) -> Result<ReplayStream> {
        let init_data =
            protocol.decode_init_data(&self.archive.read_file(archive::INIT_DATA)?)?;
        let tracker = self.archive.read_file(archive::TRACKER_EVENTS)?;
        let messages =
            protocol.message_events(&self.archive.read_file(archive::MESSAGE_EVENTS)?)?;

        let roster =
            identity::resolve_roster(&self.details, &init_data, protocol.tracker_events(&tracker))?;
        Ok(ReplayStream::new(
            protocol,
            tracker,
            messages,
            MatchState::new(roster),
        ))
    }

    /// Parses the whole match.
    ///
    /// Drives the stream to completion. When the protocol was a
    /// lower-bracket substitute and decoding fails, retries once with
    /// the upper bracket before giving up.
    ///
    /// # Errors
    ///
    /// - `ParserError::DecodeError` when the exact protocol fails
    /// - `ParserError::ProtocolUnavailable` when both bracket
    ///   substitutes fail
    /// - `ParserError::IncompleteMatch` when the recording ends before
    ///   the match resolves
    pub fn parse(&self) -> Result<ParsedMatch> {
        let exact = Protocol::exact(self.header.base_build).is_some();
        match self.parse_with(self.protocol) {
            Ok(parsed) => Ok(parsed),
            Err(err) if exact || err.is_terminal() => Err(err),
            Err(err) => {
                let (_, upper) = Protocol::closest(self.header.base_build);
                let Some(retry) = upper.and_then(Protocol::exact) else {
                    return Err(self.protocol_exhausted(vec![self.protocol.base_build()]));
                };
                warn!(
                    failed_build = self.protocol.base_build(),
                    retry_build = retry.base_build(),
                    error = %err,
                    "bracket protocol failed, retrying with upper"
                );
                self.parse_with(retry).map_err(|second| {
                    if second.is_terminal() {
                        second
                    } else {
                        self.protocol_exhausted(vec![
                            self.protocol.base_build(),
                            retry.base_build(),
                        ])
                    }
                })
            }
        }
    }

    fn protocol_exhausted(&self, tried: Vec<u32>) -> ParserError {
        ParserError::ProtocolUnavailable {
            build: self.header.base_build,
            tried,
        }
    }

    fn parse_with(&self, protocol: Protocol) -> Result<ParsedMatch> {
        let mut stream = self.stream_with(protocol)?;
        let mut match_events = Vec::new();
        for item in stream.by_ref() {
            for payload in item?.payloads {
                if let StreamPayload::Match(event) = payload {
                    match_events.push(event);
                }
            }
        }

        let (roster, segments) = stream.into_state().into_parts();
        if segments.get(SegmentKind::Final).is_none() {
            return Err(ParserError::IncompleteMatch {
                reason: "recording ended before the match resolved".to_owned(),
            });
        }

        let game_id = self.game_id().unwrap_or_else(|err| {
            debug!(error = %err, "game id unavailable");
            None
        });
        Ok(ParsedMatch::build(
            roster,
            segments.captures().clone(),
            match_events,
            game_id,
        ))
    }
}

/// One team in the match report.
#[derive(Debug, Clone, Serialize)]
pub struct TeamSummary {
    /// Team id.
    pub id: TeamId,
    /// Member player names in roster order.
    pub members: Vec<String>,
    /// Whether every member is out of the match.
    pub eliminated: bool,
    /// Whether this team won.
    pub winner: bool,
}

/// One player's full line in the match report.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerReport {
    /// Battle.net profile identifier.
    pub profile_id: String,
    /// Display name without clan tag.
    pub name: String,
    /// Team id.
    pub team: Option<TeamId>,
    /// Spawn position.
    pub position: Option<i64>,
    /// Lane partner's name, when any.
    pub lane: Option<String>,
    /// Lobby color.
    pub color: PlayerColor,
    /// Departed without being killed.
    pub left_game: bool,
    /// Eliminated by an opponent.
    pub eliminated: bool,
    /// 1-based elimination order.
    pub victim_number: Option<u32>,
    /// Seconds of game time at elimination.
    pub eliminated_at: Option<f64>,
    /// Member of the winning team.
    pub winner: bool,
    /// Army plus economy kill minerals.
    pub total_score: i64,
    /// Unspent minerals at the last sample.
    pub minerals_on_hand: i64,
    /// Per-unit-type tallies summed over every observed key.
    pub unit_stats: BTreeMap<String, UnitTally>,
    /// Award-weighted kills per opposing player name.
    pub feed: BTreeMap<String, i64>,
    /// Final research totals per upgrade name.
    pub upgrades: BTreeMap<String, i64>,
    /// Chat sent to everyone.
    pub all_chats: Vec<ChatLine>,
    /// Chat sent to allies.
    pub allied_chats: Vec<ChatLine>,
}

/// The complete result of a batch parse.
#[derive(Debug, Serialize)]
pub struct ParsedMatch {
    /// Battle.net game id, when the game stream carried one.
    pub game_id: Option<i64>,
    /// Match length in seconds of game time.
    pub game_length: f64,
    /// The winning team, absent for a draw.
    pub winner: Option<TeamId>,
    /// No team won.
    pub is_draw: bool,
    /// Teams in id order.
    pub teams: Vec<TeamSummary>,
    /// Players in roster order.
    pub players: Vec<PlayerReport>,
    /// Classified match events in causal order.
    pub match_events: Vec<MatchEvent>,
    /// Milestone snapshots in order.
    pub segments: BTreeMap<SegmentKind, SegmentCapture>,
    /// The final roster, for callers needing raw state.
    #[serde(skip)]
    pub roster: Roster,
}

impl ParsedMatch {
    fn build(
        roster: Roster,
        segments: BTreeMap<SegmentKind, SegmentCapture>,
        match_events: Vec<MatchEvent>,
        game_id: Option<i64>,
    ) -> ParsedMatch {
        let game_length = segments
            .get(&SegmentKind::Final)
            .map_or(0.0, |c| c.game_time);
        let winner = roster.winning_team().map(|t| t.id);

        let teams = roster
            .teams()
            .into_iter()
            .map(|team| TeamSummary {
                id: team.id,
                members: team
                    .members
                    .iter()
                    .filter_map(|&id| roster.get(id))
                    .map(|p| p.name.clone())
                    .collect(),
                eliminated: team.eliminated,
                winner: team.winner,
            })
            .collect();

        let players = roster
            .active()
            .map(|p| {
                let mut unit_stats: BTreeMap<String, UnitTally> = BTreeMap::new();
                for units in p.stats.totals.values() {
                    for (unit, tally) in units {
                        let entry = unit_stats.entry(unit.clone()).or_default();
                        entry.created += tally.created;
                        entry.lost += tally.lost;
                        entry.killed += tally.killed;
                        entry.cancelled += tally.cancelled;
                    }
                }
                PlayerReport {
                    profile_id: p.profile_id.clone(),
                    name: p.name.clone(),
                    team: p.team,
                    position: p.position,
                    lane: p
                        .lane
                        .and_then(|id| roster.get(id))
                        .map(|partner| partner.name.clone()),
                    color: p.color,
                    left_game: p.left_game,
                    eliminated: p.eliminated,
                    victim_number: p.victim_number,
                    eliminated_at: p.eliminated_at,
                    winner: p.winner,
                    total_score: p.stats.total_score(),
                    minerals_on_hand: p.stats.score.minerals_current,
                    unit_stats,
                    feed: roster.feed(p.id),
                    upgrades: p.upgrade_totals.clone(),
                    all_chats: p.all_chats.clone(),
                    allied_chats: p.allied_chats.clone(),
                }
            })
            .collect();

        ParsedMatch {
            game_id,
            game_length,
            winner,
            is_draw: winner.is_none(),
            teams,
            players,
            match_events,
            segments,
            roster,
        }
    }

    /// The report line for a player by name.
    #[must_use]
    pub fn player(&self, name: &str) -> Option<&PlayerReport> {
        self.players.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::player::{Player, PlayerId, StatCategory, UserId};

    fn roster_with_winner() -> Roster {
        let mut players = Vec::new();
        for (id, team, position, winner) in
            [(1, 0, 0, false), (2, 1, 2, true)]
        {
            let mut p = Player::new(PlayerId(id));
            p.name = format!("P{id}");
            p.profile_id = format!("1-S2-1-{id}");
            p.user_id = Some(UserId(id + 10));
            p.team = Some(TeamId(team));
            p.position = Some(position);
            p.winner = winner;
            players.push(p);
        }
        players[0].eliminated = true;
        players[0].victim_number = Some(1);
        Roster::new(players)
    }

    fn final_segment(roster: &Roster) -> BTreeMap<SegmentKind, SegmentCapture> {
        let mut segments = BTreeMap::new();
        segments.insert(
            SegmentKind::Final,
            SegmentCapture {
                game_time: 900.0,
                valid: true,
                players: roster.snapshots(),
            },
        );
        segments
    }

    #[test]
    fn test_parsed_match_reports_winner_and_length() {
        let roster = roster_with_winner();
        let segments = final_segment(&roster);
        let parsed = ParsedMatch::build(roster, segments, Vec::new(), Some(7));

        assert_eq!(parsed.winner, Some(TeamId(1)));
        assert!(!parsed.is_draw);
        assert_eq!(parsed.game_id, Some(7));
        assert!((parsed.game_length - 900.0).abs() < f64::EPSILON);
        assert_eq!(parsed.teams.len(), 2);
        assert!(parsed.player("P2").unwrap().winner);
        assert_eq!(parsed.player("P1").unwrap().victim_number, Some(1));
    }

    #[test]
    fn test_parsed_match_draw_when_no_winner() {
        let mut players = Vec::new();
        for (id, team, position) in [(1, 0, 0), (2, 1, 2)] {
            let mut p = Player::new(PlayerId(id));
            p.name = format!("P{id}");
            p.team = Some(TeamId(team));
            p.position = Some(position);
            p.left_game = true;
            players.push(p);
        }
        let roster = Roster::new(players);
        let segments = final_segment(&roster);
        let parsed = ParsedMatch::build(roster, segments, Vec::new(), None);

        assert_eq!(parsed.winner, None);
        assert!(parsed.is_draw);
    }

    #[test]
    fn test_unit_stats_summed_across_observed_keys() {
        let mut p = Player::new(PlayerId(1));
        p.name = "P1".to_owned();
        p.team = Some(TeamId(0));
        p.position = Some(0);
        p.stats.increment(PlayerId(1), "Marine", StatCategory::Created);
        p.stats.increment(PlayerId(2), "Marine", StatCategory::Lost);
        let roster = Roster::new(vec![p]);
        let segments = final_segment(&roster);

        let parsed = ParsedMatch::build(roster, segments, Vec::new(), None);
        let stats = &parsed.player("P1").unwrap().unit_stats["Marine"];
        assert_eq!(stats.created, 1);
        assert_eq!(stats.lost, 1);
    }

    #[test]
    fn test_expected_titles_cover_dev_map() {
        assert!(EXPECTED_TITLES.contains(&"Zone Control CE"));
        assert!(EXPECTED_TITLES.contains(&"Zone Control CE Dev"));
    }
}
