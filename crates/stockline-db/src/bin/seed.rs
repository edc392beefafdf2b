//! # Seed Data Generator
//!
//! Populates a development database with a small catalog, opening stock,
//! thresholds and one open contingency.
//!
//! ## Usage
//! ```bash
//! # Seed the configured database (stockline.toml / STOCKLINE_DB_PATH)
//! cargo run -p stockline-db --bin seed
//!
//! # Specify database path and location
//! cargo run -p stockline-db --bin seed -- --db ./data/stockline.db --location store-1
//! ```
//!
//! ## Generated Data
//! - Products per category, SKU `{CATEGORY}-{INDEX}`, fake EAN-13 barcode
//! - Opening stock 0 - 60 at the location, written through the ledger
//! - Thresholds for every product (minimo 5, punto de reposicion 15, maximo 50)
//! - One `conciliacion` contingency on the FRZ category

use std::env;
use std::path::PathBuf;
use stockline_core::{AdjustRequest, ContingencyKind, ReconciliationScope, StockThresholds};
use stockline_db::{Database, InventoryConfig};
use tracing_subscriber::EnvFilter;

/// Catalog used for development data
const CATEGORIES: &[(&str, &[&str])] = &[
    ("BEV", &["Agua Mineral", "Cola", "Jugo de Naranja", "Te Helado", "Cafe Frio"]),
    ("SNK", &["Papas Fritas", "Galletas", "Mani Salado", "Chocolate", "Barra de Cereal"]),
    ("DRY", &["Leche Entera", "Yogur Natural", "Queso Fresco", "Mantequilla"]),
    ("FRZ", &["Helado Vainilla", "Pizza Congelada", "Verduras Mixtas"]),
];

const ACTOR: &str = "seed";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut db_path: Option<String> = None;
    let mut location = String::from("store-1");
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--location" | "-l" => {
                if i + 1 < args.len() {
                    location = args[i + 1].clone();
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Stockline Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>         Database file path (overrides config)");
                println!("  -l, --location <ID>     Location to stock (default: store-1)");
                println!("  -c, --config <PATH>     Configuration file");
                println!("  -h, --help              Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = match config_path {
        Some(path) => InventoryConfig::load(Some(path.as_path()))?,
        None => InventoryConfig::load_default()?,
    };
    if let Some(path) = db_path {
        config.database.path = path;
    }

    println!("Stockline Seed Data Generator");
    println!("=============================");
    println!("Database: {}", config.database.path);
    println!("Location: {}", location);
    println!();

    let db = Database::from_config(&config).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let first_sku = format!("{}-{:03}", CATEGORIES[0].0, 0);
    if db.products().get_by_sku(&first_sku).await?.is_some() {
        println!("⚠ Database already has seed products");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let ledger = db.ledger();
    let alerts = db.alerts();
    let start = std::time::Instant::now();
    let mut generated = 0usize;

    for (category, names) in CATEGORIES {
        for (index, name) in names.iter().enumerate() {
            let seed = generated * 7 + index;
            let sku = format!("{}-{:03}", category, index);
            let barcode = format!("779{:010}", generated);

            let product = db
                .products()
                .create(&sku, Some(&barcode), name, Some(*category))
                .await?;

            let opening = (seed % 61) as i64;
            if opening > 0 {
                ledger
                    .adjust(AdjustRequest::new(
                        &product.id,
                        &location,
                        opening,
                        "seed:opening-stock",
                        ACTOR,
                    ))
                    .await?;
            }

            alerts
                .set_thresholds(&StockThresholds {
                    product_id: product.id.clone(),
                    location_id: location.clone(),
                    minimo: 5,
                    maximo: Some(50),
                    punto_reposicion: Some(15),
                })
                .await?;

            generated += 1;
        }
    }

    let contingency = db
        .contingencies()
        .insert(
            &ReconciliationScope::category(&location, "FRZ"),
            ContingencyKind::Conciliacion,
            "Freezer count under review",
        )
        .await?;

    let active = alerts.active(&location).await?;

    println!();
    println!("✓ Generated {} products in {:?}", generated, start.elapsed());
    println!("  Active alerts at {}: {}", location, active.len());
    println!("  Open contingency {} gates FRZ reconciliation", contingency.id);
    println!();
    println!("✓ Seed complete!");

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stockline=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
