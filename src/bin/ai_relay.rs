//! ai-relay: command-line front end for the generation relay.
//!
//! Usage:
//!   ai-relay generate <model> <prompt>    Generate text, falling back across providers
//!   ai-relay estimate <n> <model>         Estimate the time for n generations
//!   ai-relay stats <model>                Show adaptive pacing state
//!   ai-relay reset [model]                Clear adaptive delays (one model or all)

use ai_relay::resilience::{format_time, FileStore, KeyValueStore, MemoryStore};
use ai_relay::telemetry::TracingEventSink;
use ai_relay::transport::EnvCredentials;
use ai_relay::{CancellationToken, GenerateOptions, Relay, RelayBuilder, RelayConfig};
use anyhow::{bail, Context, Result};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "generate" => cmd_generate(&args[2..]).await,
        "estimate" => cmd_estimate(&args[2..]),
        "stats" => cmd_stats(&args[2..]),
        "reset" => cmd_reset(&args[2..]),
        "version" | "--version" | "-V" => {
            cmd_version();
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"ai-relay: adaptive scheduling and fallback for AI text generation

USAGE:
    ai-relay <COMMAND> [ARGS]

COMMANDS:
    generate <model> <prompt>   Generate text, starting with <model>
    estimate <n> <model>        Estimate the duration of n sequential generations
    stats <model>               Show base/current delay and success streak
    reset [model]               Clear adaptive delays for one model or all
    version                     Show version information
    help                        Show this help message

ENVIRONMENT:
    AI_RELAY_CONFIG             YAML config file (built-in providers otherwise)
    AI_RELAY_STATE_DIR          Directory for persisted adaptive delays
    <PROVIDER>_API_KEY          API key per provider (e.g. GEMINI_API_KEY)
    RUST_LOG                    Log filter (e.g. ai_relay=debug)"#
    );
}

fn cmd_version() {
    println!("ai-relay {}", env!("CARGO_PKG_VERSION"));
}

/// Persisted state lives in `AI_RELAY_STATE_DIR`; without it every command
/// starts from configured base delays.
fn state_store() -> Arc<dyn KeyValueStore> {
    match FileStore::from_env() {
        Some(store) => Arc::new(store),
        None => Arc::new(MemoryStore::new()),
    }
}

fn build_relay() -> Result<Relay> {
    let config = RelayConfig::from_env().context("loading configuration")?;
    let relay = RelayBuilder::new()
        .with_config(config)
        .with_store(state_store())
        .with_credentials(Arc::new(EnvCredentials::new().with_keyring("ai-relay")))
        .with_event_sink(Arc::new(TracingEventSink))
        .build()?;
    Ok(relay)
}

async fn cmd_generate(args: &[String]) -> Result<()> {
    let (Some(model), Some(_)) = (args.first(), args.get(1)) else {
        bail!("usage: ai-relay generate <model> <prompt>");
    };
    let prompt = args[1..].join(" ");
    let relay = build_relay()?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let generation = relay
        .generate(
            &prompt,
            GenerateOptions::new()
                .with_model(model.as_str())
                .with_cancel(cancel)
                .with_context("cli"),
        )
        .await?;

    println!("{}", generation.text);
    eprintln!();
    eprintln!(
        "model: {}  tokens: {} in / {} out  time: {}",
        generation.model_used,
        generation.usage.prompt_tokens,
        generation.usage.completion_tokens,
        format_time(generation.usage.generation_time_ms)
    );
    eprintln!("session cost: {}", relay.usage().format_cost());
    Ok(())
}

fn cmd_estimate(args: &[String]) -> Result<()> {
    let (Some(n), Some(model)) = (args.first(), args.get(1)) else {
        bail!("usage: ai-relay estimate <n> <model>");
    };
    let n: u64 = n.parse().with_context(|| format!("invalid count: {n}"))?;
    let relay = build_relay()?;
    let estimate = relay.estimate_time(n, model);
    println!(
        "{n} generation(s) on {model}: ~{} ({} ms delay + generation per item)",
        format_time(estimate.total_ms),
        estimate.delay_ms
    );
    Ok(())
}

fn cmd_stats(args: &[String]) -> Result<()> {
    let Some(model) = args.first() else {
        bail!("usage: ai-relay stats <model>");
    };
    let relay = build_relay()?;
    let stats = relay.stats(model);
    println!("model:          {}", stats.model);
    println!("base delay:     {} ms", stats.base_delay_ms);
    println!("current delay:  {} ms", stats.current_delay_ms);
    println!("success streak: {}", stats.success_streak);
    println!("adapted:        {}", stats.is_adapted);
    Ok(())
}

fn cmd_reset(args: &[String]) -> Result<()> {
    let relay = build_relay()?;
    let model = args.first().map(String::as_str);
    relay.tracker().reset(model);
    println!("reset {}", model.unwrap_or("all models"));
    Ok(())
}
