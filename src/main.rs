use anyhow::{bail, Context, Result};
use std::env;
use std::sync::Arc;

// Use library instead of local modules
use invoice_dashboard::{
    fetch_card_data, fetch_invoices_by_amount, queries::DIAGNOSTIC_AMOUNT, Cancellation, Config,
    EntityKind, Loader, SqliteGateway,
};

fn usage() -> &'static str {
    "usage: invoice-dashboard <seed|query|cards>"
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let command = match args.get(1).map(String::as_str) {
        Some(cmd @ ("seed" | "query" | "cards")) => cmd,
        _ => bail!(usage()),
    };

    let config = Config::from_env().context("Failed to read configuration")?;

    match command {
        "seed" => run_seed(&config).await,
        "query" => run_query(&config).await,
        _ => run_cards(&config).await,
    }
}

fn open(config: &Config) -> Result<Arc<SqliteGateway>> {
    let gateway = SqliteGateway::from_config(config)
        .with_context(|| format!("Failed to open {}", config.database_url))?;
    Ok(Arc::new(gateway))
}

async fn run_seed(config: &Config) -> Result<()> {
    println!("🌱 Seeding dashboard database");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let seed = config.seed_data()?;
    match &config.seed_dir {
        Some(dir) => println!("✓ Loaded {} records from {}", seed.record_count(), dir.display()),
        None => println!("✓ Using built-in demo data ({} records)", seed.record_count()),
    }

    let gateway = open(config)?;
    let loader = Loader::new(gateway, Arc::new(seed));
    let summary = loader
        .run_until(&Cancellation::with_timeout(config.seed_timeout))
        .await?;

    for entity in EntityKind::ALL {
        let Some(phase) = summary.phase(entity) else {
            println!("  {:<10} skipped", entity.to_string());
            continue;
        };
        println!("  {:<10} {}/{} written", entity.to_string(), phase.written, phase.attempted);
        for failure in &phase.failures {
            println!("    ✗ {}: {}", failure.record, failure.error);
        }
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if summary.is_complete() {
        println!("🎉 Database seeded successfully");
    } else if summary.cancelled {
        println!("⏹  Seeding cancelled{}", if summary.rolled_back { " (rolled back)" } else { "" });
    } else {
        println!("⚠️  Seeded with {} failures", summary.failures().count());
    }
    if !summary.transactional {
        println!("   best-effort mode: completed phases stay written");
    }

    Ok(())
}

async fn run_query(config: &Config) -> Result<()> {
    let gateway = open(config)?;
    let invoices = fetch_invoices_by_amount(gateway.as_ref(), DIAGNOSTIC_AMOUNT).await?;
    println!("{}", serde_json::to_string_pretty(&invoices)?);
    Ok(())
}

async fn run_cards(config: &Config) -> Result<()> {
    let gateway = open(config)?;
    let cards = fetch_card_data(gateway.as_ref()).await?;
    println!("{}", serde_json::to_string_pretty(&cards)?);
    Ok(())
}
