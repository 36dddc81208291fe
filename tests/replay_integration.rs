//! End-to-end tests over complete synthetic replay archives.
//!
//! Every test builds a real compound archive through the fixture
//! builders and drives it through the public entry points, so the
//! whole chain from container to match report is exercised together.

mod common;

use common::{
    born_body, chat_body, died_body, players_2v2, push_match_prefix, push_tracker,
    push_user_record, stats_body, transfer_body, build_replay, build_replay_titled,
    FixturePlayer,
};
use zc_parser::replay::state::StreamPayload;
use zc_parser::{MatchEventKind, ParserError, Replay, SegmentKind, TeamId};

/// Tracker stream for a full 2v2 where team 1 eliminates team 0.
///
/// Starting bunkers carry tags 101-104 (one per player id).
fn decisive_tracker(players: &[FixturePlayer]) -> Vec<u8> {
    let mut tracker = Vec::new();
    push_match_prefix(&mut tracker, players);

    // periodic stats samples
    for p in players {
        push_tracker(&mut tracker, 0, 0, stats_body(p.player_id, 50, 0));
    }

    // mid-game construction by player 3
    push_tracker(&mut tracker, 2_000, 1, born_body(200, "Bunker", 3, 40, 70));
    push_tracker(&mut tracker, 100, 1, born_body(201, "Tank", 3, 40, 70));

    // team 1 takes down team 0's starting bunkers
    push_tracker(&mut tracker, 8_000, 2, died_body(101, Some(3), 20, 80));
    push_tracker(&mut tracker, 1_000, 2, died_body(102, Some(4), 30, 90));
    tracker
}

#[test]
fn test_open_reads_container_facts() {
    let players = players_2v2();
    let data = build_replay(80949, &players, decisive_tracker(&players), Vec::new());

    let replay = Replay::open(&data).unwrap();
    let info = replay.info();
    assert_eq!(info.title, "Zone Control CE");
    assert_eq!(info.base_build, 80949);
    assert_eq!(info.protocol_build, 80949);
    assert_eq!(info.elapsed_game_loops, 30_000);
    assert_eq!(info.entries.len(), 7);
    assert_eq!(replay.details().players.len(), 4);
    assert_eq!(replay.game_id().unwrap(), Some(4242));
}

#[test]
fn test_full_match_parse() {
    let players = players_2v2();
    let data = build_replay(80949, &players, decisive_tracker(&players), Vec::new());

    let parsed = Replay::open(&data).unwrap().parse().unwrap();

    assert_eq!(parsed.winner, Some(TeamId(1)));
    assert!(!parsed.is_draw);
    assert_eq!(parsed.game_id, Some(4242));
    assert!(parsed.game_length > 0.0);

    let keys: Vec<&str> = parsed.match_events.iter().map(|e| e.key).collect();
    assert_eq!(
        keys,
        vec![
            "bunker_started",
            "tank_started",
            "bunker_killed",
            "player_died",
            "bunker_killed",
            "player_died",
        ]
    );

    let p1 = parsed.player("Player1").unwrap();
    assert_eq!(p1.victim_number, Some(1));
    assert!(p1.eliminated);
    assert!(!p1.winner);
    let p2 = parsed.player("Player2").unwrap();
    assert_eq!(p2.victim_number, Some(2));

    assert!(parsed.player("Player3").unwrap().winner);
    assert!(parsed.player("Player4").unwrap().winner);

    // the deciding event captured the final milestone
    assert!(parsed.segments.contains_key(&SegmentKind::Final));
    let team0 = parsed.teams.iter().find(|t| t.id == TeamId(0)).unwrap();
    assert!(team0.eliminated);
}

#[test]
fn test_lane_partners_symmetric() {
    let players = players_2v2();
    let data = build_replay(80949, &players, decisive_tracker(&players), Vec::new());

    let parsed = Replay::open(&data).unwrap().parse().unwrap();
    // positions 1 and 2 face each other across the lane
    assert_eq!(
        parsed.player("Player2").unwrap().lane.as_deref(),
        Some("Player3")
    );
    assert_eq!(
        parsed.player("Player3").unwrap().lane.as_deref(),
        Some("Player2")
    );
}

#[test]
fn test_streaming_matches_batch() {
    let players = players_2v2();
    let data = build_replay(80949, &players, decisive_tracker(&players), Vec::new());
    let replay = Replay::open(&data).unwrap();

    let mut streamed = Vec::new();
    for item in replay.stream().unwrap() {
        for payload in item.unwrap().payloads {
            if let StreamPayload::Match(event) = payload {
                streamed.push(event);
            }
        }
    }

    let parsed = replay.parse().unwrap();
    assert_eq!(streamed, parsed.match_events);
}

#[test]
fn test_parse_is_deterministic() {
    let players = players_2v2();
    let data = build_replay(80949, &players, decisive_tracker(&players), Vec::new());
    let replay = Replay::open(&data).unwrap();

    let first = serde_json::to_string(&replay.parse().unwrap()).unwrap();
    let second = serde_json::to_string(&replay.parse().unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_unknown_build_decodes_with_lower_bracket() {
    let players = players_2v2();
    // 80500 sits between known builds 80188 and 80949
    let data = build_replay(80500, &players, decisive_tracker(&players), Vec::new());

    let replay = Replay::open(&data).unwrap();
    assert_eq!(replay.info().base_build, 80500);
    assert_eq!(replay.info().protocol_build, 80188);

    let parsed = replay.parse().unwrap();
    assert_eq!(parsed.winner, Some(TeamId(1)));
}

#[test]
fn test_wrong_title_rejected() {
    let players = players_2v2();
    let data = build_replay_titled(
        "Direct Strike",
        80949,
        &players,
        decisive_tracker(&players),
        Vec::new(),
    );

    let result = Replay::open(&data);
    assert!(matches!(
        result,
        Err(ParserError::NotExpectedFormat { .. })
    ));
}

#[test]
fn test_abandoned_recording_rejected() {
    // both players on team 0: neither details entry records a win
    let players: Vec<FixturePlayer> = (0..2)
        .map(|i| FixturePlayer {
            player_id: i + 1,
            user_id: i + 10,
            slot_id: i,
            name: format!("Player{}", i + 1),
            position: i,
        })
        .collect();
    let mut tracker = Vec::new();
    push_match_prefix(&mut tracker, &players);
    let data = build_replay(80949, &players, tracker, Vec::new());

    let result = Replay::open(&data);
    assert!(matches!(result, Err(ParserError::IncompleteMatch { .. })));
}

#[test]
fn test_unresolved_match_is_incomplete() {
    // nobody ever eliminated: the final milestone is never reached
    let players = players_2v2();
    let mut tracker = Vec::new();
    push_match_prefix(&mut tracker, &players);
    push_tracker(&mut tracker, 5_000, 0, stats_body(1, 50, 0));
    let data = build_replay(80949, &players, tracker, Vec::new());

    let result = Replay::open(&data).unwrap().parse();
    assert!(matches!(result, Err(ParserError::IncompleteMatch { .. })));
}

#[test]
fn test_bracket_substitutes_exhausted_on_truncation() {
    let players = players_2v2();
    let mut tracker = Vec::new();
    push_match_prefix(&mut tracker, &players);
    push_tracker(&mut tracker, 100, 0, stats_body(1, 50, 0));
    // chop the last record mid-body; both substitutes run off the end
    tracker.truncate(tracker.len() - 3);
    let data = build_replay(80500, &players, tracker, Vec::new());

    let result = Replay::open(&data).unwrap().parse();
    match result {
        Err(ParserError::ProtocolUnavailable { build, tried }) => {
            assert_eq!(build, 80500);
            assert_eq!(tried, vec![80188, 80949]);
        }
        other => panic!("expected ProtocolUnavailable, got {other:?}"),
    }
}

#[test]
fn test_unresolvable_stats_update_skipped() {
    let players = players_2v2();
    let mut tracker = Vec::new();
    push_match_prefix(&mut tracker, &players);
    // stats for a player id nothing resolves
    push_tracker(&mut tracker, 100, 0, stats_body(99, 500, 500));
    push_tracker(&mut tracker, 7_900, 2, died_body(101, Some(3), 20, 80));
    push_tracker(&mut tracker, 1_000, 2, died_body(102, Some(4), 30, 90));
    let data = build_replay(80949, &players, tracker, Vec::new());

    let parsed = Replay::open(&data).unwrap().parse().unwrap();
    assert_eq!(parsed.winner, Some(TeamId(1)));
    assert_eq!(parsed.player("Player1").unwrap().victim_number, Some(1));
}

#[test]
fn test_disconnect_transfer_marks_leaver() {
    let players = players_2v2();
    let mut tracker = Vec::new();
    push_match_prefix(&mut tracker, &players);
    // player 1 disconnects; the map hands their bunker to player 2
    push_tracker(&mut tracker, 4_000, 3, transfer_body(101, 2));
    // team 1 then finishes off the remaining two team-0 bunkers
    push_tracker(&mut tracker, 4_000, 2, died_body(101, Some(3), 20, 80));
    push_tracker(&mut tracker, 1_000, 2, died_body(102, Some(4), 30, 90));
    let data = build_replay(80949, &players, tracker, Vec::new());

    let parsed = Replay::open(&data).unwrap().parse().unwrap();
    let p1 = parsed.player("Player1").unwrap();
    assert!(p1.left_game);
    assert!(!p1.eliminated);
    assert_eq!(p1.victim_number, Some(1));

    // creation credit is conserved across the transfer
    let total_created: u32 = parsed
        .players
        .iter()
        .map(|p| p.unit_stats.get("Bunker").map_or(0, |t| t.created))
        .sum();
    assert_eq!(total_created, 4);
    assert_eq!(
        parsed
            .player("Player2")
            .unwrap()
            .unit_stats["Bunker"]
            .created,
        2
    );

    let first_event = &parsed.match_events[0];
    assert_eq!(first_event.kind, MatchEventKind::PlayerLeave);
}

#[test]
fn test_nuke_scored_from_stats_delta() {
    let players = players_2v2();
    let mut tracker = Vec::new();
    push_match_prefix(&mut tracker, &players);
    push_tracker(&mut tracker, 100, 0, stats_body(3, 50, 200));
    push_tracker(&mut tracker, 1_000, 1, born_body(300, "Nuke", 3, 40, 70));
    push_tracker(&mut tracker, 500, 2, died_body(300, None, 40, 70));
    push_tracker(&mut tracker, 200, 0, stats_body(3, 50, 950));
    // resolve the match so the parse completes
    push_tracker(&mut tracker, 6_200, 2, died_body(101, Some(3), 20, 80));
    push_tracker(&mut tracker, 1_000, 2, died_body(102, Some(4), 30, 90));
    let data = build_replay(80949, &players, tracker, Vec::new());

    let parsed = Replay::open(&data).unwrap().parse().unwrap();
    let nuke = parsed
        .match_events
        .iter()
        .find(|e| e.kind == MatchEventKind::PlayerNuked)
        .unwrap();
    assert_eq!(nuke.value, 750);
    assert!(nuke.description.contains("Player3"));
    // the event is stamped with the nuke's gameloop, not the sample's
    assert_eq!(nuke.gameloop, 1_600);
}

#[test]
fn test_chat_attribution() {
    let players = players_2v2();
    let mut messages = Vec::new();
    push_user_record(&mut messages, 500, 10, 0, chat_body(0, "gl hf"));
    push_user_record(&mut messages, 500, 10, 0, chat_body(2, "push top"));
    let data = build_replay(80949, &players, decisive_tracker(&players), messages);

    let parsed = Replay::open(&data).unwrap().parse().unwrap();
    let p1 = parsed.player("Player1").unwrap();
    assert_eq!(p1.all_chats.len(), 1);
    assert_eq!(p1.all_chats[0].text, "gl hf");
    assert_eq!(p1.allied_chats.len(), 1);
    assert_eq!(p1.allied_chats[0].text, "push top");
}

#[test]
fn test_victim_numbers_strictly_increase() {
    let players = players_2v2();
    let data = build_replay(80949, &players, decisive_tracker(&players), Vec::new());

    let parsed = Replay::open(&data).unwrap().parse().unwrap();
    let mut numbers: Vec<u32> = parsed
        .players
        .iter()
        .filter_map(|p| p.victim_number)
        .collect();
    numbers.sort_unstable();
    assert_eq!(numbers, vec![1, 2]);

    let winners: Vec<&str> = parsed
        .players
        .iter()
        .filter(|p| p.winner)
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(winners, vec!["Player3", "Player4"]);
}

#[test]
fn test_attribute_events_decode() {
    let players = players_2v2();
    let data = build_replay(80949, &players, decisive_tracker(&players), Vec::new());

    let replay = Replay::open(&data).unwrap();
    let attributes = replay.attribute_events().unwrap();
    assert_eq!(attributes.map_namespace, 999);
    assert!(attributes.entries.is_empty());
}
