//! aprs-feeder: standalone ingestion binary.
//!
//! Supports:
//! - Running the APRS-IS full-feed client until Ctrl-C
//! - Importing a TNC2 log file into the packet store

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use aprs_core::config::{self, load_config};
use aprs_core::types::now;
use aprs_feeder::lines::clean_line;
use aprs_feeder::{FeedConfig, IngestSession, Login, PacketStore};

/// Spacing between imported frames, so replay order matches file order.
const IMPORT_STEP_SECS: f64 = 0.001;

#[derive(Parser)]
#[command(name = "aprs-feeder", version, about = "APRS-IS full-feed ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to APRS-IS and store every received line
    Run {
        /// Operator callsign (overrides config)
        #[arg(long)]
        callsign: Option<String>,

        /// Station SSID (overrides config)
        #[arg(long)]
        ssid: Option<String>,

        /// APRS-IS pass code; omit for a receive-only login
        #[arg(long, allow_hyphen_values = true)]
        passcode: Option<i32>,

        /// Feed host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Feed port (overrides config)
        #[arg(long)]
        port: Option<u16>,

        /// Packet store path (overrides config)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Append a TNC2 log file to the packet store
    Import {
        /// File with one TNC2 frame per line
        file: PathBuf,

        /// Packet store path (overrides config)
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = load_config();

    match cli.command {
        Commands::Run {
            callsign,
            ssid,
            passcode,
            host,
            port,
            db,
        } => {
            let login = Login::new(
                callsign.as_deref().unwrap_or(&cfg.station.callsign),
                ssid.as_deref().unwrap_or(&cfg.station.ssid),
                passcode.or(cfg.station.passcode),
            );
            let mut feed = FeedConfig::from_config(&cfg);
            if let Some(h) = host {
                feed.host = h;
            }
            if let Some(p) = port {
                feed.port = p;
            }
            let db = db.unwrap_or_else(|| PathBuf::from(&cfg.database.path));
            cmd_run(login, db, feed);
        }
        Commands::Import { file, db } => {
            let db = db.unwrap_or_else(|| PathBuf::from(&cfg.database.path));
            cmd_import(file, db);
        }
    }
}

fn cmd_run(login: Option<Login>, db: PathBuf, feed: FeedConfig) {
    if login.is_none() {
        eprintln!(
            "No callsign configured. Pass --callsign or set station.callsign in {}",
            config::config_file().display()
        );
        std::process::exit(1);
    }

    let Some(mut session) = IngestSession::start(login, Some(db), feed) else {
        eprintln!("Error: ingestion could not be started");
        std::process::exit(1);
    };

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(tokio::signal::ctrl_c()) {
        eprintln!("Error waiting for Ctrl-C: {e}");
    }

    session.stop();
    let stats = session.stats();
    eprintln!(
        "{} lines received, {} stored, {} dropped over {} connection attempts",
        stats.lines_received, stats.frames_stored, stats.inserts_dropped, stats.connect_attempts
    );
}

fn cmd_import(file: PathBuf, db: PathBuf) {
    let bytes = match std::fs::read(&file) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error reading {}: {e}", file.display());
            std::process::exit(1);
        }
    };
    let mut store = match PacketStore::open(&db) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error opening {}: {e}", db.display());
            std::process::exit(1);
        }
    };

    let start = now();
    let mut imported = 0u64;
    let mut failed = 0u64;
    for raw in bytes.split(|&b| b == b'\n') {
        let Some(line) = clean_line(raw) else {
            continue;
        };
        let ts = start + imported as f64 * IMPORT_STEP_SECS;
        match store.insert(ts, &line) {
            Ok(()) => imported += 1,
            Err(_) => failed += 1,
        }
    }
    if let Err(e) = store.flush() {
        eprintln!("Error committing import: {e}");
        std::process::exit(1);
    }

    eprintln!("Imported {imported} frames into {} ({failed} failed)", db.display());
}
