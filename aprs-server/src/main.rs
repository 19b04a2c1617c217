//! aprs: CLI + web server for APRS VHF propagation.

use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};

use aprs_core::config::load_config;
use aprs_core::footprint::aggregate;
use aprs_core::frame::parse_tnc2;
use aprs_core::propagation::{GraphBuilder, PropagationGraph, PropagationParams};
use aprs_core::types::{now, RawFrame, Window};
use aprs_feeder::{FeedConfig, IngestSession, Login};

mod api;
mod web;

#[derive(Parser)]
#[command(name = "aprs", version, about = "APRS-IS VHF propagation overlay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP read API, ingesting the feed in the background
    Serve {
        /// Bind address (overrides config)
        #[arg(long, env = "APRS_HOST")]
        host: Option<String>,

        /// Bind port (overrides config)
        #[arg(long, env = "APRS_PORT")]
        port: Option<u16>,

        /// Packet store path (overrides config)
        #[arg(long, env = "APRS_DB")]
        db: Option<PathBuf>,

        /// Operator callsign for the feed login (overrides config)
        #[arg(long, env = "APRS_CALLSIGN")]
        callsign: Option<String>,

        /// Serve the existing store without connecting to the feed
        #[arg(long)]
        no_ingest: bool,
    },

    /// Decode TNC2 frames from a file and print a station table
    Decode {
        /// File with one TNC2 frame per line (`-` for stdin)
        file: PathBuf,

        /// Print each parsed frame instead of the summary table
        #[arg(short, long)]
        raw: bool,
    },

    /// Compute footprints from the packet store
    Overlay {
        /// Look-back window in hours
        #[arg(long)]
        hours: Option<f64>,

        /// Packet store path (overrides config)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Print the JSON payload served by the read API
        #[arg(long)]
        json: bool,
    },

    /// Show packet store statistics
    Stats {
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
    let config_db = PathBuf::from(&cfg.database.path);

    match cli.command {
        Commands::Serve {
            host,
            port,
            db,
            callsign,
            no_ingest,
        } => {
            let state = web::AppState {
                db_path: db.unwrap_or(config_db),
                params: cfg.propagation.params(),
                default_hours: cfg.propagation.default_hours,
            };
            let login = if no_ingest {
                None
            } else {
                Login::new(
                    callsign.as_deref().unwrap_or(&cfg.station.callsign),
                    &cfg.station.ssid,
                    cfg.station.passcode,
                )
            };
            cmd_serve(
                state,
                host.unwrap_or(cfg.dashboard.host.clone()),
                port.unwrap_or(cfg.dashboard.port),
                login,
                FeedConfig::from_config(&cfg),
            );
        }
        Commands::Decode { file, raw } => cmd_decode(file, raw, cfg.propagation.params()),
        Commands::Overlay { hours, db, json } => {
            let db = db.unwrap_or(config_db);
            let window = Window::from_hours(hours, cfg.propagation.default_hours);
            cmd_overlay(&db, window, cfg.propagation.params(), json);
        }
        Commands::Stats { db } => cmd_stats(&db.unwrap_or(config_db)),
    }
}

fn cmd_serve(
    state: web::AppState,
    host: String,
    port: u16,
    login: Option<Login>,
    feed: FeedConfig,
) {
    let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Error starting runtime: {e}");
        std::process::exit(1);
    });

    let session = IngestSession::start(login, Some(state.db_path.clone()), feed);
    if session.is_none() {
        tracing::info!("no callsign configured, serving existing store only");
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {e}");
        }
    };
    let result = rt.block_on(web::serve(state, &host, port, shutdown));

    // Stops and joins the ingestion thread
    drop(session);

    if let Err(e) = result {
        eprintln!("Error serving on {host}:{port}: {e}");
        std::process::exit(1);
    }
}

fn cmd_decode(file: PathBuf, raw: bool, params: PropagationParams) {
    let reader: Box<dyn BufRead> = if file.to_str() == Some("-") {
        Box::new(io::stdin().lock())
    } else {
        let f = std::fs::File::open(&file).unwrap_or_else(|e| {
            eprintln!("Error opening {}: {e}", file.display());
            std::process::exit(1);
        });
        Box::new(io::BufReader::new(f))
    };

    let lines = reader.lines().filter_map(|l| l.ok());
    let builder = decode_lines(lines, params, raw).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let total = builder.total_frames;
    let with_position = builder.position_frames;
    let graph = builder.finish();
    if !raw {
        print_stations(&graph, &params, total, with_position);
    }
}

/// Replay TNC2 lines in file order. Files carry no capture times, so each
/// line gets its index as a synthetic timestamp.
fn decode_lines(
    lines: impl IntoIterator<Item = String>,
    params: PropagationParams,
    raw: bool,
) -> aprs_core::Result<GraphBuilder> {
    let mut builder = GraphBuilder::new(params);
    let mut index = 0u64;

    for line in lines {
        let text = line.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        if raw {
            match parse_tnc2(text) {
                Some(f) => {
                    let pos = f
                        .position()
                        .map(|p| format!("{:.4},{:.4}", p.lat, p.lon))
                        .unwrap_or("-".into());
                    println!("{} via {:?} @ {pos}", f.source, f.stations()[1..].to_vec());
                }
                None => println!("(unparsed) {text}"),
            }
        }

        builder.push(&RawFrame::new(index as f64, text))?;
        index += 1;
    }
    Ok(builder)
}

fn print_stations(
    graph: &PropagationGraph,
    params: &PropagationParams,
    total_frames: u64,
    position_frames: u64,
) {
    println!();
    println!(
        "Frames: {total_frames} read, {position_frames} with position, {} stations, {} hops, {} footprints",
        graph.positions.len(),
        graph.segments.len(),
        aggregate(graph, params).len()
    );
    println!();

    if graph.positions.is_empty() {
        return;
    }

    let mut hops: BTreeMap<&str, usize> = BTreeMap::new();
    for seg in &graph.segments {
        *hops.entry(seg.from_callsign.as_str()).or_default() += 1;
        *hops.entry(seg.to_callsign.as_str()).or_default() += 1;
    }

    let mut table = Table::new();
    table.set_header(vec!["Callsign", "Lat", "Lon", "Symbol", "Hops", "Heard"]);

    for (call, pos) in &graph.positions {
        table.add_row(vec![
            Cell::new(call),
            Cell::new(format!("{:.4}", pos.lat)),
            Cell::new(format!("{:.4}", pos.lon)),
            Cell::new(format!("{}{}", pos.symbol_table, pos.symbol_code)),
            Cell::new(hops.get(call.as_str()).copied().unwrap_or(0)),
            Cell::new(graph.heard_by.get(call).map(|h| h.len()).unwrap_or(0)),
        ]);
    }

    println!("{table}");
}

fn cmd_overlay(
    db_path: &std::path::Path,
    window: Window,
    params: PropagationParams,
    json: bool,
) {
    let overlay = api::propagation_overlay(db_path, window, now(), params);

    if json {
        match serde_json::to_string_pretty(&overlay) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("Error: {e}"),
        }
        return;
    }

    println!();
    println!(
        "Window: {:.2} h, {} hops, {} footprints ({})",
        window.hours(),
        overlay.segments.len(),
        overlay.blobs.len(),
        db_path.display()
    );
    println!();

    if overlay.blobs.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Lat", "Lon", "Vertices", "Max (km)"]);
    let mut blobs = overlay.blobs.iter().collect::<Vec<_>>();
    blobs.sort_by(|a, b| b.max_dist.total_cmp(&a.max_dist));
    for blob in blobs {
        table.add_row(vec![
            Cell::new(format!("{:.4}", blob.lat)),
            Cell::new(format!("{:.4}", blob.lon)),
            Cell::new(blob.hull.len()),
            Cell::new(format!("{:.1}", blob.max_dist)),
        ]);
    }
    println!("{table}");
}

fn cmd_stats(db_path: &std::path::Path) {
    let stats = api::stats(db_path);
    let fmt_ts = |t: Option<f64>| t.map(|v| format!("{v:.3}")).unwrap_or("-".into());

    println!();
    println!("Packet store: {}", db_path.display());
    println!();
    println!("  Packets:  {}", stats.count);
    println!("  Oldest:   {}", fmt_ts(stats.oldest));
    println!("  Newest:   {}", fmt_ts(stats.newest));
    println!();
}
