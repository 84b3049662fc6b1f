//! # Demo Data Seeder
//!
//! Creates a demo series and walks a few numbers through their lifecycle.
//!
//! ## Usage
//! ```bash
//! # Seed the database named in ornum.toml (or ./ornum.db)
//! cargo run -p ornum-db --bin seed
//!
//! # Allocate 50 numbers for each of 3 cashiers
//! cargo run -p ornum-db --bin seed -- --count 50 --users 3
//!
//! # Specify config file and database path
//! cargo run -p ornum-db --bin seed -- --config ./ornum.toml --db ./data/ornum.db
//! ```
//!
//! Every cashier gets its own offset band. The first number of each cashier
//! is marked used and the second voided, so all three statuses show up on
//! the dashboard.

use chrono::{Datelike, NaiveDate, Utc};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ornum_core::{GenerationMethod, NewSeries};
use ornum_db::{Database, OrnumConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ornum_db=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 10;
    let mut users: usize = 2;
    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(10);
                    i += 1;
                }
            }
            "--users" | "-u" => {
                if i + 1 < args.len() {
                    users = args[i + 1].parse().unwrap_or(2);
                    i += 1;
                }
            }
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("OR Number Demo Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>      Numbers per cashier (default: 10)");
                println!("  -u, --users <N>      Number of cashiers (default: 2)");
                println!("      --config <PATH>  Config file (default: ./ornum.toml)");
                println!("  -d, --db <PATH>      Database file, overrides the config");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let config_path = config_path.unwrap_or_else(|| PathBuf::from("ornum.toml"));
    let mut config = OrnumConfig::load(Some(&config_path))?;
    if let Some(path) = db_path {
        config.database.path = path;
    }

    println!("OR Number Demo Seeder");
    println!("=====================");
    println!("Database: {}", config.database.path.display());
    println!("Cashiers: {}", users);
    println!("Numbers:  {} per cashier", count);
    println!();

    let db = Database::new(config.database.to_db_config()).await?;
    println!("✓ Connected to database");

    let today = Utc::now().date_naive();
    let year_start = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
    let year_end = NaiveDate::from_ymd_opt(today.year(), 12, 31);

    let series = db
        .series()
        .create(NewSeries {
            name: format!("Demo OR {}", today.year()),
            prefix: Some("OR".to_string()),
            start_number: 1,
            end_number: Some(999_999),
            format_template: "{PREFIX}-{YEAR}{MONTH}-{NUMBER:6}".to_string(),
            band_size: config.allocator.default_band_size,
            effective_from: year_start,
            effective_to: year_end,
            notes: Some("Created by the demo seeder".to_string()),
            created_by: "seed".to_string(),
        })
        .await?;
    println!("✓ Created series {} ({})", series.name, series.id);

    let allocator = db.allocator(config.allocator.clone());
    let issued = db.issued_numbers();
    let start = std::time::Instant::now();

    for u in 0..users {
        let user_id = format!("cashier-{}", u + 1);

        for n in 0..count {
            let number = allocator
                .allocate(&series.id, &user_id, today, GenerationMethod::Automatic)
                .await?;

            match n {
                0 => {
                    issued
                        .mark_used(&number.id, &format!("TXN-{}-{:04}", user_id, n))
                        .await?;
                }
                1 => {
                    issued
                        .mark_voided(&number.id, &user_id, "Printer jam")
                        .await?;
                }
                _ => {}
            }
        }

        let counter = db.counters().get(&series.id, &user_id).await?;
        if let Some(counter) = counter {
            let band = counter.band(series.band_size);
            println!(
                "  {} issued {} numbers in band {}..={}",
                user_id,
                count,
                band.first(),
                band.last()
            );
        }
    }

    let elapsed = start.elapsed();
    let counts = issued.count_by_status(&series.id).await?;
    let usage = db.series().usage_snapshot(&series.id).await?;

    println!();
    println!("✓ Allocated {} numbers in {:?}", counts.total(), elapsed);
    println!(
        "  generated: {}  used: {}  voided: {}",
        counts.generated, counts.used, counts.voided
    );
    println!("  series usage: {:.4}%", usage.usage_percentage);
    println!();
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}
