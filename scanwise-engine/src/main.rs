//! scanwise - progressive product analysis CLI
//!
//! Runs one pipeline run per invocation: identify a product from a barcode
//! or photo, enrich the report section by section, and print it once the
//! run settles. Also pages through previously persisted scans.

use anyhow::Result;
use clap::{Parser, Subcommand};
use scanwise_common::config::load_config;
use scanwise_common::events::ScanEvent;
use scanwise_engine::pipeline::ScanSnapshot;
use scanwise_engine::types::{FailureKind, ScanKey};
use scanwise_engine::{ScanEngine, ScanOutcome};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scanwise", version, about = "Progressive product analysis")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyse a product by barcode
    Scan {
        /// Barcode digits as printed on the product
        barcode: String,
    },
    /// Analyse a product from a captured photo
    Photo {
        /// Path or handle of the captured image
        image: String,
    },
    /// List previously persisted scans
    History {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.logging.filter.clone()))
        .init();

    info!("Starting scanwise {}", env!("CARGO_PKG_VERSION"));

    let engine = ScanEngine::from_config(&config)?;

    match cli.command {
        Command::Scan { barcode } => run_scan(&engine, ScanKey::Barcode(barcode)).await,
        Command::Photo { image } => run_scan(&engine, ScanKey::Photo(image)).await,
        Command::History { page, limit } => print_history(&engine, page, limit).await,
    }
}

async fn run_scan(engine: &ScanEngine, key: ScanKey) -> Result<()> {
    let snapshot = match engine.scan(key).await {
        ScanOutcome::Cached(snapshot) => snapshot,
        ScanOutcome::Started(mut handle) => {
            let mut events = handle.events();
            let progress = tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    match event {
                        ScanEvent::IdentityResolved { product_name, .. } => {
                            println!("Identified: {}", product_name);
                        }
                        ScanEvent::SectionSeparated {
                            section,
                            item_count,
                            ..
                        } => {
                            println!("{:?}: {} items found", section, item_count);
                        }
                        ScanEvent::SectionFailed { section, error, .. } => {
                            println!("{:?}: analysis unavailable ({})", section, error);
                        }
                        ScanEvent::RunSettled { .. } => break,
                        ScanEvent::RunFailed { .. } => break,
                        _ => {}
                    }
                }
            });
            let snapshot = handle.finished().await;
            progress.abort();
            snapshot
        }
    };
    print_report(&snapshot);
    Ok(())
}

fn print_report(snapshot: &ScanSnapshot) {
    if let Some(failure) = snapshot.failure {
        let hint = match failure {
            FailureKind::NotFound => "Product not found. Try photographing the label instead.",
            FailureKind::NetworkUnavailable => "Network unavailable. Check your connection.",
            FailureKind::Other => "Analysis failed.",
        };
        println!("{}", hint);
        if let Some(error) = &snapshot.error {
            println!("  detail: {}", error);
        }
        return;
    }

    let vm = &snapshot.view_model;
    println!();
    println!("== {} ==", vm.identity.name);
    if let Some(brand) = &vm.identity.brand {
        println!("Brand: {}", brand);
    }
    if let Some(score) = vm.safety_score {
        println!("Safety score: {:.0}", score);
    }

    if !vm.ingredients.harmful.is_empty() {
        println!("\nHarmful ingredients:");
        for (name, description) in &vm.ingredients.harmful {
            print_tagged(name, description);
        }
    }
    if !vm.ingredients.safe.is_empty() {
        println!("\nSafe ingredients:");
        for (name, description) in &vm.ingredients.safe {
            print_tagged(name, description);
        }
    }

    if !vm.packaging.analysis.is_empty() {
        println!("\nPackaging ({:?}):", vm.packaging.overall_safety);
        if !vm.packaging.summary.is_empty() {
            println!("  {}", vm.packaging.summary);
        }
        for (material, details) in &vm.packaging.analysis {
            let text = scanwise_engine::format::build_packaging_description_text(details);
            print_tagged(&scanwise_engine::format::format_tag_name(material), &text);
        }
    }

    if let Some(recommendations) = &snapshot.recommendations {
        if !recommendations.vetted_products.is_empty() {
            println!("\nSafer picks:");
            for product in &recommendations.vetted_products {
                print_tagged(&product.name, product.description.as_deref().unwrap_or(""));
            }
        }
        if !recommendations.ai_alternatives.is_empty() {
            println!("\nAlternatives:");
            for alt in &recommendations.ai_alternatives {
                print_tagged(&alt.name, &alt.description);
            }
        }
    }
}

fn print_tagged(name: &str, description: &str) {
    if description.is_empty() {
        println!("  - {}", name);
    } else {
        println!("  - {}: {}", name, description.replace('\n', " / "));
    }
}

async fn print_history(engine: &ScanEngine, page: u32, limit: u32) -> Result<()> {
    let records = engine.history(page, limit).await?;
    if records.is_empty() {
        println!("No scans on page {}.", page);
        return Ok(());
    }
    for record in records {
        println!(
            "{}  [{}] {} ({} harmful / {} safe ingredients)",
            record.recorded_at.format("%Y-%m-%d %H:%M"),
            record.scan_type,
            record.product_name,
            record.harmful_ingredients.len(),
            record.safe_ingredients.len(),
        );
    }
    Ok(())
}
