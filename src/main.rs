//! Absorption explorer CLI: print one feature-absorption view

use std::path::PathBuf;

use absorption_explorer::{
    DashboardArtifact, DashboardSlot, Explorer, ExplorerConfig, ProbeSlot, SelectionRequest,
};
use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "absorption-explorer")]
#[command(about = "Explore feature absorption in Gemma Scope SAEs")]
#[command(version)]
struct Cli {
    /// JSON config file (defaults are used for absent keys)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dataset root, overrides the config's data_dir
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Model layer
    #[arg(long)]
    layer: Option<u32>,

    /// SAE width (e.g. 16000, 65000)
    #[arg(long)]
    width: Option<u32>,

    /// SAE L0; defaults to the canonical L0 when available
    #[arg(long)]
    l0: Option<u32>,

    /// First letter to inspect
    #[arg(long)]
    letter: Option<char>,

    /// Write the full view as JSON to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also print N random tokens with and without the letter
    #[arg(long, default_value_t = 0)]
    sample: usize,

    /// Seed for token sampling
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn describe_slot(slot: &DashboardSlot) -> String {
    match (&slot.artifact, &slot.missing) {
        (Some(DashboardArtifact::Remote { url }), _) => url.clone(),
        (Some(DashboardArtifact::Inline { escaped_html }), _) => {
            format!("inline ({} bytes)", escaped_html.len())
        }
        (None, Some(message)) => format!("not found: {message}"),
        (None, None) => "unavailable".to_string(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => ExplorerConfig::load(path)?,
        None => ExplorerConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir);
    }

    let explorer = Explorer::open(config);
    let request = SelectionRequest {
        layer: cli.layer,
        sae_width: cli.width,
        sae_l0: cli.l0,
        letter: cli.letter,
    };

    let Some(view) = explorer.view(&request)? else {
        println!("No SAE configurations found.");
        return Ok(());
    };

    let selection = &view.selection;
    println!("=== Feature Absorption Explorer ===");
    println!(
        "Layer {}, SAE width {}, SAE L0 {}{}",
        selection.sae.layer,
        selection.sae.sae_width,
        selection.sae.sae_l0,
        if selection.is_canonical {
            " (canonical)"
        } else {
            ""
        }
    );

    let Some(letter) = selection.letter else {
        println!("No letters available for this SAE.");
        return Ok(());
    };

    println!("\n=== Letters ===");
    for l in &selection.available_letters {
        let count = selection.absorbing_counts.get(l).copied().unwrap_or(0);
        let marker = if *l == letter { "*" } else { " " };
        println!("{marker} {l}: {count} absorbing latents");
    }

    let absorption = &view.absorption;
    println!("\n=== Split latents for '{letter}' ===");
    println!("True positives: {}", absorption.num_true_positives);
    for slot in &view.split_dashboards {
        println!("  {:>6}  {}", slot.latent, describe_slot(slot));
    }

    println!("\n=== Absorbing latents ===");
    if absorption.absorbing_latents.is_empty() {
        println!("  none");
    }
    for (latent, tokens) in &absorption.absorbing_latents {
        let tokens: Vec<&str> = tokens.iter().map(String::as_str).collect();
        println!("  {:>6}  {}", latent, tokens.join(", "));
    }
    if absorption.truncated {
        println!(
            "  ... showing {} of {} absorbing latents",
            absorption.absorbing_latents.len(),
            absorption.total_absorbing_latents
        );
    }
    for slot in view.absorbing_dashboards.iter().filter(|s| s.missing.is_some()) {
        println!("  dashboard for {}: {}", slot.latent, describe_slot(slot));
    }

    println!("\n=== SAE latent vs. probe ===");
    match &view.probe {
        Some(ProbeSlot::Available { stats }) => {
            println!(
                "SAE:   precision {:.3}  recall {:.3}  F1 {:.3}",
                stats.sae_metrics.precision, stats.sae_metrics.recall, stats.sae_metrics.f1
            );
            println!(
                "Probe: precision {:.3}  recall {:.3}  F1 {:.3}",
                stats.probe_metrics.precision, stats.probe_metrics.recall, stats.probe_metrics.f1
            );
        }
        Some(ProbeSlot::Missing { message }) => println!("Probe statistics unavailable: {message}"),
        Some(ProbeSlot::NoData) | None => println!("No probe statistics for this selection."),
    }

    if cli.sample > 0 {
        let sampler = explorer.token_sampler()?;
        println!("\n=== Sample tokens ===");
        println!(
            "Starting with '{letter}': {}",
            sampler.sample_letter_tokens(letter, cli.sample, cli.seed).join(", ")
        );
        println!(
            "Not starting with '{letter}': {}",
            sampler
                .sample_non_letter_tokens(letter, cli.sample, cli.seed)
                .join(", ")
        );
    }

    if let Some(output) = &cli.output {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output, serde_json::to_string_pretty(&view)?)?;
        info!("View saved to {}", output.display());
    }

    Ok(())
}
