//! Low-level archive inspection tool
//!
//! Dumps the MPQ container structure of an `.SC2Replay` file: headers,
//! named entries with sizes, and optionally a raw entry's bytes. Works
//! on any Zone Control replay, including ones the parser would reject
//! as incomplete.

use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use zc_parser::archive::STREAM_ENTRIES;
use zc_parser::protocol::decode_replay_header;
use zc_parser::MpqArchive;

/// Inspect the MPQ container of an .SC2Replay file
#[derive(Parser)]
#[command(name = "dump")]
#[command(about = "Inspect the MPQ container of an .SC2Replay file", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the replay file
    file: PathBuf,
    /// Write one entry's raw decompressed bytes to stdout
    #[arg(short, long)]
    entry: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let data = match std::fs::read(&cli.file) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error reading file: {e}");
            return ExitCode::FAILURE;
        }
    };

    let archive = match MpqArchive::open(&data) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error opening archive: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(entry) = cli.entry {
        return dump_entry(&archive, &entry);
    }

    print_structure(&archive, data.len());
    ExitCode::SUCCESS
}

fn dump_entry(archive: &MpqArchive<'_>, entry: &str) -> ExitCode {
    match archive.read_file(entry) {
        Ok(bytes) => {
            if std::io::stdout().write_all(&bytes).is_err() {
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error reading entry '{entry}': {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_structure(archive: &MpqArchive<'_>, file_size: usize) {
    let user_data = archive.user_data();
    let header = archive.header();

    println!("=== Container ===");
    println!("File size: {file_size} bytes");
    println!("User data size: {}", user_data.user_data_size);
    println!("Archive offset: 0x{:X}", user_data.header_offset);
    println!("Archive size: {} bytes", header.archive_size);
    println!("Format version: {}", header.format_version);
    println!("Sector size: {} bytes", archive.sector_size());
    println!("Hash table entries: {}", header.hash_table_entries);
    println!("Block table entries: {}", header.block_table_entries);

    println!("\n=== Replay Header ===");
    match decode_replay_header(&user_data.content) {
        Ok(replay_header) => {
            let (major, minor, revision, build) = replay_header.version;
            println!("Version: {major}.{minor}.{revision}.{build}");
            println!("Base build: {}", replay_header.base_build);
            println!("Game loops: {}", replay_header.elapsed_game_loops);
        }
        Err(e) => println!("(undecodable: {e})"),
    }

    println!("\n=== Entries ===");
    for name in STREAM_ENTRIES {
        if archive.has_file(name) {
            let size = archive
                .read_file(name)
                .map_or_else(|e| format!("unreadable: {e}"), |b| format!("{} bytes", b.len()));
            println!("  {name}: {size}");
        } else {
            println!("  {name}: missing");
        }
    }
}
