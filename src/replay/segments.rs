//! Milestone snapshot capture.
//!
//! Four segments are captured per match, each exactly once, first
//! match wins: `early` at eight minutes of game time, then
//! `three_teams`, `two_teams`, and `final` as the count of surviving
//! teams drops. A segment is `valid` only when the milestone is
//! meaningful for the match's starting team count; `final` taken
//! before `early` back-fills `early` as invalid so every completed
//! match carries all four.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::protocol::events::game_time;
use crate::replay::player::{PlayerSnapshot, Roster};

/// Game time in seconds after which the early segment fires.
pub const EARLY_SEGMENT_SECONDS: f64 = 480.0;

/// The four fixed milestones, in capture precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// Eight minutes of game time elapsed.
    Early,
    /// At most three teams remain.
    ThreeTeams,
    /// At most two teams remain.
    TwoTeams,
    /// At most one team remains; match resolution.
    Final,
}

impl SegmentKind {
    /// The stable string key.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            SegmentKind::Early => "early",
            SegmentKind::ThreeTeams => "three_teams",
            SegmentKind::TwoTeams => "two_teams",
            SegmentKind::Final => "final",
        }
    }
}

/// One captured milestone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentCapture {
    /// Seconds of game time at capture.
    pub game_time: f64,
    /// Whether the milestone is meaningful for this match's size.
    pub valid: bool,
    /// Snapshot of every active player.
    pub players: Vec<PlayerSnapshot>,
}

/// Captures each milestone the first time its condition holds.
#[derive(Debug, Clone, Default)]
pub struct SegmentRecorder {
    captures: BTreeMap<SegmentKind, SegmentCapture>,
}

impl SegmentRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        SegmentRecorder::default()
    }

    /// Checks all milestone conditions after one event.
    ///
    /// Returns the segments captured by this check, in capture order,
    /// so a streaming consumer sees each exactly once.
    pub fn check(&mut self, gameloop: u32, roster: &Roster) -> Vec<(SegmentKind, SegmentCapture)> {
        // round off float noise so exactly eight minutes is not past
        // the threshold
        let time = (game_time(gameloop) * 1e4).round() / 1e4;
        let starting = roster.team_count();
        let remaining = roster.teams_remaining();
        let mut captured = Vec::new();

        if !self.captures.contains_key(&SegmentKind::Early) && time > EARLY_SEGMENT_SECONDS {
            self.capture(SegmentKind::Early, time, true, roster, &mut captured);
        }
        if !self.captures.contains_key(&SegmentKind::ThreeTeams) && remaining <= 3 {
            self.capture(
                SegmentKind::ThreeTeams,
                time,
                starting > 3,
                roster,
                &mut captured,
            );
        }
        if !self.captures.contains_key(&SegmentKind::TwoTeams) && remaining <= 2 {
            self.capture(
                SegmentKind::TwoTeams,
                time,
                starting > 2,
                roster,
                &mut captured,
            );
        }
        if !self.captures.contains_key(&SegmentKind::Final) && remaining <= 1 {
            self.capture(SegmentKind::Final, time, starting > 1, roster, &mut captured);
            // a short match ends before the early mark; back-fill it
            // as not meaningful
            if !self.captures.contains_key(&SegmentKind::Early) {
                self.capture(SegmentKind::Early, time, false, roster, &mut captured);
            }
        }

        captured
    }

    fn capture(
        &mut self,
        kind: SegmentKind,
        game_time: f64,
        valid: bool,
        roster: &Roster,
        captured: &mut Vec<(SegmentKind, SegmentCapture)>,
    ) {
        let capture = SegmentCapture {
            game_time,
            valid,
            players: roster.snapshots(),
        };
        self.captures.insert(kind, capture.clone());
        captured.push((kind, capture));
    }

    /// A captured milestone, when it fired.
    #[must_use]
    pub fn get(&self, kind: SegmentKind) -> Option<&SegmentCapture> {
        self.captures.get(&kind)
    }

    /// All captures in milestone order.
    #[must_use]
    pub fn captures(&self) -> &BTreeMap<SegmentKind, SegmentCapture> {
        &self.captures
    }

    /// Game time of the final segment; the match length.
    #[must_use]
    pub fn game_length(&self) -> f64 {
        self.get(SegmentKind::Final).map_or(0.0, |c| c.game_time)
    }
}
