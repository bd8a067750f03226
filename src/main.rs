use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use affect_fusion::emotion::{EmotionVector, ScoreMap};
use affect_fusion::fusion::{DisplayState, FusionResult};
use affect_fusion::history::History;
use affect_fusion::{Config, FusionClient, FusionOrchestrator, FusionOutcome, SensorSnapshot};

/// Fuse text and face emotion scores through the fusion service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Text to analyze
    #[arg(short, long)]
    text: Option<String>,

    /// Face scores as a JSON object, e.g. '{"joy": 0.9, "neutral": 0.1}'
    #[arg(short, long)]
    face: Option<String>,

    /// Fusion service base URL (overrides config)
    #[arg(short, long)]
    url: Option<String>,

    /// Config file (defaults to ~/.affectfusion/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Analyze each line read from stdin until EOF or Ctrl+C
    #[arg(long)]
    stdin: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load_or_default(),
    };
    if let Some(url) = &args.url {
        config.service_url = url.clone();
    }

    let face = match &args.face {
        Some(raw) => Some(parse_face_scores(raw)?),
        None => None,
    };

    if args.text.is_none() && !args.stdin {
        bail!("Nothing to analyze: pass --text or --stdin");
    }

    let client = FusionClient::new(&config.service_url, config.request_timeout())
        .context("Failed to create fusion client")?;
    info!("Fusion service: {}", client.endpoint());

    let history = History::with_limits(config.history_capacity, config.history_text_limit);
    let orchestrator = FusionOrchestrator::new(Arc::new(client), history);

    if let Some(text) = &args.text {
        analyze_and_print(&orchestrator, text, face).await;
    }

    if args.stdin {
        println!("\nReading lines from stdin... Press Ctrl+C to stop.\n");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C received, stopping");
                    break;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        analyze_and_print(&orchestrator, &line, face).await;
                    }
                    Ok(None) => {
                        debug!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        }
    }

    print_history(&orchestrator.display_state());
    Ok(())
}

/// Parse and normalize a JSON score map passed on the command line
fn parse_face_scores(raw: &str) -> Result<EmotionVector> {
    let scores: ScoreMap = serde_json::from_str(raw).context("Invalid --face JSON")?;
    let vector = EmotionVector::normalize(scores);
    debug!("Face vector: top {}", vector.top_label());
    Ok(vector)
}

async fn analyze_and_print(
    orchestrator: &FusionOrchestrator,
    text: &str,
    face: Option<EmotionVector>,
) {
    let snapshot = SensorSnapshot {
        text: text.to_string(),
        face,
    };
    match orchestrator.analyze(snapshot).await {
        FusionOutcome::Fused(result) => print_result(&result),
        FusionOutcome::AwaitingInput => println!("Awaiting input"),
        FusionOutcome::Busy => println!("Analysis already in progress"),
        FusionOutcome::Failed => println!("Error: fusion request failed"),
    }
}

fn print_result(result: &FusionResult) {
    println!("\n--- Fused: {} ---", result.fused_label);
    for (label, score) in result.fused_scores.ranked() {
        println!("  {:<9} {:.4}", label.as_str(), score);
    }
    println!("Text: {}", result.text_label);
    println!("Face: {}", result.face_label);
}

fn print_history(display: &DisplayState) {
    if display.history.is_empty() {
        return;
    }
    println!("\n--- History ---\n");
    for entry in display.history.entries() {
        println!(
            "{}  {:<9} {}",
            entry.recorded_at.format("%H:%M:%S"),
            entry.label,
            entry.text
        );
    }
}
