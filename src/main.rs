//! EcoGo Mode Detector CLI
//!
//! Replays recorded sensor traces through the detector and inspects its state.

use clap::{Parser, Subcommand};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use ecogo_mode_detector::{
    collector::{ReplayConfig, ReplaySource, TraceRecord},
    config::Config,
    core::{features::FEATURE_NAMES, reconcile},
    detector::{ModeDetector, PredictionEvent},
    stats::create_shared_stats_with_persistence,
    DecisionTreeClassifier, TransportMode, VERSION,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ecogo-mode")]
#[command(author = "EcoGo")]
#[command(version = VERSION)]
#[command(about = "Transport mode detection from phone sensor streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a recorded JSON-lines trace through the detector
    Replay {
        /// Trace file with sample, speed and pressure records
        trace: PathBuf,

        /// Mode the user declared for this trip (walking, cycling, bus, subway, driving)
        #[arg(long)]
        declared: Option<TransportMode>,

        /// Pace the replay by the recorded timestamps
        #[arg(long)]
        realtime: bool,
    },

    /// Show cumulative detection statistics
    Status,

    /// Show configuration
    Config,

    /// List the feature vector layout
    Features,

    /// Run the HTTP ingest server (requires server feature)
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8787")]
        port: u16,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            trace,
            declared,
            realtime,
        } => {
            cmd_replay(trace, declared, realtime);
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Config => {
            cmd_config();
        }
        Commands::Features => {
            cmd_features();
        }
        #[cfg(feature = "server")]
        Commands::Serve { port } => {
            cmd_serve(port);
        }
    }
}

fn cmd_replay(trace: PathBuf, declared: Option<TransportMode>, realtime: bool) {
    println!("EcoGo Mode Detector v{VERSION}");
    println!();

    let mut config = Config::load().unwrap_or_default();
    // Recorded timestamps lie in the past; only sample time may close windows.
    config.flush_on_idle = false;
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    let mismatch_confidence = config.mismatch_confidence;

    println!("Replaying {}", trace.display());
    println!("  Window duration: {}s", config.window_duration.as_secs());
    println!("  Smoothing window: {}", config.effective_smoothing_window());
    if let Some(mode) = declared {
        println!("  Declared mode: {mode}");
    }
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let stats = create_shared_stats_with_persistence(config.stats_path());
    let detector = ModeDetector::with_parts(
        config,
        Arc::new(DecisionTreeClassifier::default()),
        stats.clone(),
    );
    let events = detector.subscribe();

    let mut source = ReplaySource::new(ReplayConfig {
        path: trace,
        realtime,
    });
    if let Err(e) = source.start() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    if let Err(e) = detector.start() {
        eprintln!("Error starting detector: {e}");
        std::process::exit(1);
    }

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let receiver = source.receiver().clone();
    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(TraceRecord::Sample(reading)) => {
                detector.submit_sample(reading);
                // Without pacing, wait for each window so none are dropped as overruns.
                if !realtime && detector.pending_windows() > 0 {
                    detector.drain(Duration::from_secs(5));
                }
            }
            Ok(TraceRecord::Speed { speed }) => detector.update_location_speed(speed),
            Ok(TraceRecord::Pressure { hpa }) => detector.update_pressure(hpa),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        print_events(&events, declared, mismatch_confidence);
    }

    if running.load(Ordering::SeqCst) {
        detector.flush();
        detector.drain(Duration::from_secs(5));
        print_events(&events, declared, mismatch_confidence);
    }

    println!();
    println!("Stopping detection...");
    source.stop();
    detector.cleanup();

    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save detection stats: {e}");
    }
    if let Some(fault) = detector.fault() {
        eprintln!("Warning: {fault}");
    }

    println!();
    println!("{}", stats.summary());
}

fn print_events(events: &Receiver<PredictionEvent>, declared: Option<TransportMode>, min_confidence: f64) {
    for event in events.try_iter() {
        let prediction = &event.prediction;
        let verdict = declared
            .map(|mode| format!(" | {}", reconcile(mode, prediction, min_confidence)))
            .unwrap_or_default();
        println!(
            "[{}] #{} {} ({:.0}%) from {} samples{}",
            event.window_end.format("%H:%M:%S"),
            event.sequence,
            prediction.mode,
            prediction.confidence * 100.0,
            event.sample_count,
            verdict
        );
    }
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("EcoGo Mode Detector Status");
    println!("==========================");
    println!();

    println!("Configuration:");
    println!("  Window duration: {}s", config.window_duration.as_secs());
    println!("  Smoothing window: {}", config.effective_smoothing_window());
    println!("  Queue capacity: {}", config.effective_queue_capacity());
    println!("  Mismatch confidence: {:.2}", config.mismatch_confidence);
    println!();

    let stats_path = config.stats_path();
    if stats_path.exists() {
        let stats = create_shared_stats_with_persistence(stats_path);
        let snapshot = stats.snapshot();
        println!("Cumulative Statistics:");
        println!("  Samples ingested: {}", snapshot.samples_ingested);
        println!("  Windows completed: {}", snapshot.windows_completed);
        println!("  Windows skipped: {}", snapshot.windows_skipped);
        println!("  Overruns dropped: {}", snapshot.overruns_dropped);
        println!("  Predictions published: {}", snapshot.predictions_published);
        if snapshot.contract_violations > 0 {
            println!("  Contract violations: {}", snapshot.contract_violations);
        }
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_features() {
    println!("Feature vector ({} entries)", FEATURE_NAMES.len());
    println!();
    for (idx, name) in FEATURE_NAMES.iter().enumerate() {
        println!("  {idx:>2}  {name}");
    }
}

#[cfg(feature = "server")]
fn cmd_serve(port: u16) {
    use ecogo_mode_detector::server::{run, ServerConfig};

    let config = Config::load().unwrap_or_default();
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error creating runtime: {e}");
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        let (addr, shutdown_tx) = run(ServerConfig::new(port, config)).await?;
        println!("Listening on http://{addr}");
        println!("Press Ctrl+C to stop");
        tokio::signal::ctrl_c().await?;
        let _ = shutdown_tx.send(());
        // Let the server task stop the detector and persist stats.
        tokio::time::sleep(Duration::from_millis(200)).await;
        anyhow::Ok(())
    });

    if let Err(e) = result {
        eprintln!("Server error: {e}");
        std::process::exit(1);
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
