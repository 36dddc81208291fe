//! Zone Control CE replay (.SC2Replay) parser CLI
//!
//! A command-line interface for parsing, validating, and analyzing Zone
//! Control replay files.
//!
//! ## Commands
//!
//! - `info` - Display quick replay metadata
//! - `parse` - Parse a match with output format options
//! - `validate` - Validate replay format (exit codes for scripting)
//! - `batch` - Process multiple replays from a directory

use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use zc_parser::{ParsedMatch, ParserError, Replay};

/// Zone Control CE replay (.SC2Replay) parser
#[derive(Parser)]
#[command(name = "zc-parser")]
#[command(about = "Zone Control CE replay (.SC2Replay) parser", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display replay information
    Info {
        /// Path to the replay file
        file: PathBuf,
    },
    /// Parse a replay file
    Parse {
        /// Path to the replay file
        file: PathBuf,
        /// Output format: json, pretty
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
        /// Include the match event log
        #[arg(long)]
        events: bool,
        /// Include per-player unit statistics
        #[arg(long)]
        stats: bool,
        /// Include chat messages
        #[arg(long)]
        chat: bool,
        /// Include milestone snapshots
        #[arg(long)]
        segments: bool,
    },
    /// Validate replay format
    Validate {
        /// Path to the replay file
        file: PathBuf,
        /// Verbose error reporting
        #[arg(short, long)]
        verbose: bool,
    },
    /// Parse multiple replay files
    Batch {
        /// Directory containing replay files
        directory: PathBuf,
        /// Output directory for JSON files
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Continue on errors
        #[arg(long)]
        continue_on_error: bool,
    },
}

/// Output format options
#[derive(Clone, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info { file } => cmd_info(&file),
        Commands::Parse {
            file,
            output,
            events,
            stats,
            chat,
            segments,
        } => cmd_parse(&file, &output, events, stats, chat, segments),
        Commands::Validate { file, verbose } => cmd_validate(&file, verbose),
        Commands::Batch {
            directory,
            output,
            continue_on_error,
        } => cmd_batch(&directory, output.as_deref(), continue_on_error),
    }
}

// ============================================================================
// Info Command Implementation
// ============================================================================

fn cmd_info(file: &Path) -> ExitCode {
    let data = match std::fs::read(file) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error reading file: {e}");
            return ExitCode::FAILURE;
        }
    };

    let replay = match Replay::open(&data) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error opening replay: {e}");
            return ExitCode::FAILURE;
        }
    };

    print_info(&replay, data.len());
    ExitCode::SUCCESS
}

#[allow(clippy::cast_precision_loss)]
fn print_info(replay: &Replay<'_>, file_size: usize) {
    let info = replay.info();

    println!("=== Replay Information ===\n");

    println!("File:");
    println!(
        "  Size: {} bytes ({:.2} KB)",
        file_size,
        file_size as f64 / 1024.0
    );
    println!("  Title: {}", info.title);
    if let Some(version) = &info.game_version {
        println!("  Game Version: {version}");
    }
    println!("  Base Build: {}", info.base_build);
    if info.protocol_build != info.base_build {
        println!("  Protocol Build: {} (substituted)", info.protocol_build);
    }
    println!("  Game Loops: {}", info.elapsed_game_loops);
    if let Some(duration) = info.duration {
        println!("  Duration: {}:{:02}", duration / 60, duration % 60);
    }

    println!();

    println!("Players:");
    for player in &replay.details().players {
        let marker = match player.result {
            Some(zc_parser::protocol::RESULT_WIN) => " (winner)",
            _ => "",
        };
        println!("  - {}{marker}", player.name);
    }

    println!();

    println!("Archive entries:");
    for entry in &info.entries {
        println!("  - {entry}");
    }
}

// ============================================================================
// Parse Command Implementation
// ============================================================================

fn cmd_parse(
    file: &Path,
    output: &OutputFormat,
    include_events: bool,
    include_stats: bool,
    include_chat: bool,
    include_segments: bool,
) -> ExitCode {
    let data = match std::fs::read(file) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error reading file: {e}");
            return ExitCode::FAILURE;
        }
    };

    let parsed = match parse_match(&data) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match output {
        OutputFormat::Json => print_json(&parsed),
        OutputFormat::Pretty => print_pretty(
            &parsed,
            include_events,
            include_stats,
            include_chat,
            include_segments,
        ),
    }

    ExitCode::SUCCESS
}

fn parse_match(data: &[u8]) -> Result<ParsedMatch, ParserError> {
    Replay::open(data)?.parse()
}

fn print_json(parsed: &ParsedMatch) {
    match serde_json::to_string_pretty(parsed) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing to JSON: {e}"),
    }
}

fn print_pretty(
    parsed: &ParsedMatch,
    include_events: bool,
    include_stats: bool,
    include_chat: bool,
    include_segments: bool,
) {
    println!("=== Match ===");
    println!("Length: {:.0}s", parsed.game_length);
    if let Some(game_id) = parsed.game_id {
        println!("Game ID: {game_id}");
    }
    match parsed.winner {
        Some(team) => println!("Winner: team {team}"),
        None => println!("Result: draw"),
    }

    println!();

    for team in &parsed.teams {
        let status = if team.winner {
            " (winner)"
        } else if team.eliminated {
            " (eliminated)"
        } else {
            ""
        };
        println!("Team {}{status}:", team.id);
        for name in &team.members {
            let player = parsed.player(name);
            let detail = player.map_or_else(String::new, |p| {
                let mut parts = vec![format!("score {}", p.total_score)];
                if let Some(n) = p.victim_number {
                    parts.push(format!("victim #{n}"));
                }
                if p.left_game {
                    parts.push("left".to_owned());
                }
                format!(" ({})", parts.join(", "))
            });
            println!("  - {name}{detail}");
        }
    }

    if include_events {
        println!("\n=== Events ({}) ===", parsed.match_events.len());
        for event in &parsed.match_events {
            println!("  [{:>7.1}s] {}", event.game_time, event.description);
        }
    }

    if include_stats {
        println!("\n=== Player Stats ===");
        for player in &parsed.players {
            println!("\n{}:", player.name);
            println!("  Total score: {}", player.total_score);
            println!("  Minerals on hand: {}", player.minerals_on_hand);
            for (unit, tally) in &player.unit_stats {
                println!(
                    "  {unit}: created {}, lost {}, killed {}, cancelled {}",
                    tally.created, tally.lost, tally.killed, tally.cancelled
                );
            }
            if !player.feed.is_empty() {
                println!("  Feed:");
                for (opponent, value) in &player.feed {
                    println!("    {opponent}: {value}");
                }
            }
        }
    }

    if include_chat {
        println!("\n=== Chat ===");
        for player in &parsed.players {
            for line in &player.all_chats {
                println!("  [{:>7.1}s] {}: {}", line.game_time, player.name, line.text);
            }
            for line in &player.allied_chats {
                println!(
                    "  [{:>7.1}s] {} (allied): {}",
                    line.game_time, player.name, line.text
                );
            }
        }
    }

    if include_segments {
        println!("\n=== Segments ===");
        for (kind, capture) in &parsed.segments {
            let validity = if capture.valid { "" } else { " (trivial)" };
            println!("  {:?} at {:.0}s{validity}:", kind, capture.game_time);
            for snapshot in &capture.players {
                println!("    {}: score {}", snapshot.name, snapshot.total_score);
            }
        }
    }
}

// ============================================================================
// Validate Command Implementation
// ============================================================================

struct ValidationResult {
    archive_valid: bool,
    match_complete: bool,
    parse_valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationResult {
    fn is_valid(&self) -> bool {
        self.archive_valid && self.match_complete && self.parse_valid
    }
}

fn cmd_validate(file: &Path, verbose: bool) -> ExitCode {
    let result = validate_replay(file);

    if verbose {
        print_validation_details(&result, file);
    } else {
        print_validation_summary(&result, file);
    }

    if result.is_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn validate_replay(file: &Path) -> ValidationResult {
    let mut result = ValidationResult {
        archive_valid: false,
        match_complete: false,
        parse_valid: false,
        errors: Vec::new(),
        warnings: Vec::new(),
    };

    let data = match std::fs::read(file) {
        Ok(d) => d,
        Err(e) => {
            result.errors.push(format!("Failed to read file: {e}"));
            return result;
        }
    };

    let replay = match Replay::open(&data) {
        Ok(r) => {
            result.archive_valid = true;
            result.match_complete = true;
            r
        }
        Err(e) => {
            match &e {
                ParserError::IncompleteMatch { .. } | ParserError::NotExpectedFormat { .. } => {
                    result.archive_valid = true;
                }
                _ => {}
            }
            result.errors.push(format!("Open failed: {e}"));
            return result;
        }
    };

    let info = replay.info();
    if info.protocol_build != info.base_build {
        result.warnings.push(format!(
            "Unknown build {}; decoding with nearest protocol {}",
            info.base_build, info.protocol_build
        ));
    }

    match replay.parse() {
        Ok(parsed) => {
            result.parse_valid = true;
            if parsed.winner.is_none() {
                result.warnings.push("Match ended in a draw".to_owned());
            }
        }
        Err(e) => {
            result.errors.push(format!("Parse failed: {e}"));
            if matches!(e, ParserError::IncompleteMatch { .. }) {
                result.match_complete = false;
            }
        }
    }

    result
}

fn print_validation_summary(result: &ValidationResult, file: &Path) {
    let status = if result.is_valid() { "VALID" } else { "INVALID" };
    println!("{}: {status}", file.display());
}

fn print_validation_details(result: &ValidationResult, file: &Path) {
    println!("Validating: {}\n", file.display());

    println!("Checks:");
    println!("  Archive structure: {}", status_icon(result.archive_valid));
    println!("  Match complete:    {}", status_icon(result.match_complete));
    println!("  Full parse:        {}", status_icon(result.parse_valid));

    if !result.errors.is_empty() {
        println!("\nErrors:");
        for error in &result.errors {
            println!("  - {error}");
        }
    }

    if !result.warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &result.warnings {
            println!("  - {warning}");
        }
    }

    println!(
        "\nResult: {}",
        if result.is_valid() { "VALID" } else { "INVALID" }
    );
}

fn status_icon(valid: bool) -> &'static str {
    if valid {
        "[OK]"
    } else {
        "[FAIL]"
    }
}

// ============================================================================
// Batch Command Implementation
// ============================================================================

fn cmd_batch(directory: &Path, output_dir: Option<&Path>, continue_on_error: bool) -> ExitCode {
    let replays = find_replays(directory);

    if replays.is_empty() {
        eprintln!("No .SC2Replay files found in {}", directory.display());
        return ExitCode::FAILURE;
    }

    eprintln!("Found {} replay files", replays.len());

    if let Some(dir) = output_dir {
        if !dir.exists() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                eprintln!("Failed to create output directory: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    let mut success_count = 0;
    let mut error_count = 0;
    let mut winners: HashMap<String, usize> = HashMap::new();

    for replay in &replays {
        eprint!(
            "Processing {}... ",
            replay.file_name().unwrap_or_default().to_string_lossy()
        );

        match process_replay(replay, output_dir) {
            Ok(parsed) => {
                eprintln!("OK");
                success_count += 1;
                let key = parsed
                    .winner
                    .map_or_else(|| "draw".to_owned(), |t| format!("team {t}"));
                *winners.entry(key).or_insert(0) += 1;
            }
            Err(e) => {
                eprintln!("ERROR: {e}");
                error_count += 1;
                if !continue_on_error {
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    eprintln!("\nProcessed: {success_count} success, {error_count} errors");

    if !winners.is_empty() {
        eprintln!("\nOutcomes:");
        let mut outcomes: Vec<_> = winners.iter().collect();
        outcomes.sort();
        for (outcome, count) in outcomes {
            eprintln!("  {outcome}: {count}");
        }
    }

    if error_count > 0 && !continue_on_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn find_replays(directory: &Path) -> Vec<PathBuf> {
    let mut replays = Vec::new();

    if let Ok(entries) = std::fs::read_dir(directory) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "SC2Replay") {
                replays.push(path);
            }
        }
    }

    replays.sort();
    replays
}

fn process_replay(replay: &Path, output_dir: Option<&Path>) -> Result<ParsedMatch, String> {
    let data = std::fs::read(replay).map_err(|e| e.to_string())?;
    let parsed = parse_match(&data).map_err(|e| e.to_string())?;

    if let Some(dir) = output_dir {
        let output_file = dir
            .join(replay.file_stem().unwrap_or_default())
            .with_extension("json");
        let content = serde_json::to_string_pretty(&parsed).map_err(|e| e.to_string())?;
        std::fs::write(&output_file, content).map_err(|e| e.to_string())?;
    }

    Ok(parsed)
}
