//! # Seed Data Generator
//!
//! Loads demo pricing rules for development.
//!
//! ## Usage
//! ```bash
//! cargo run -p tally-db --bin seed
//!
//! # Specify database path and branch
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db --branch north
//! ```
//!
//! ## Generated Rules
//! - Storewide 5% off (lowest priority)
//! - Gold tier 10% off
//! - $1.50 off lines of 6 or more
//! - $5.00 off when the cart is at least $50.00
//! - Free item for the branch's opening week
//!
//! Rules are upserted by fixed id, so running twice is harmless.

use chrono::{Duration, Utc};
use std::env;
use tally_core::{DiscountType, PricingRule, RuleCondition};
use tally_db::{Database, DbConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./tally_dev.db");
    let mut branch_id = String::from("main");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--branch" | "-b" => {
                if i + 1 < args.len() {
                    branch_id = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>        Database file path (default: ./tally_dev.db)");
                println!("  -b, --branch <ID>      Branch for branch-scoped rules (default: main)");
                println!("  -h, --help             Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Tally POS Seed Data Generator");
    println!("================================");
    println!("Database: {}", db_path);
    println!("Branch:   {}", branch_id);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let rules = demo_rules(&branch_id);
    for rule in &rules {
        db.pricing_rules().upsert(rule).await?;
        println!("  {:<28} priority {:>3}", rule.name, rule.priority);
    }

    let active = db.pricing_rules().list_active().await?;
    println!();
    println!("✓ {} rules upserted, {} active in database", rules.len(), active.len());
    println!("✓ Seed complete!");

    Ok(())
}

fn demo_rules(branch_id: &str) -> Vec<PricingRule> {
    let now = Utc::now();
    let year = Duration::days(365);

    let rule = |id: &str, name: &str, priority: i32, discount_type, value, conditions| PricingRule {
        id: id.to_string(),
        name: name.to_string(),
        priority,
        valid_from: now - Duration::days(1),
        valid_to: now + year,
        discount_type,
        discount_value: value,
        conditions,
        is_active: true,
    };

    vec![
        rule(
            "demo-storewide-5",
            "Storewide 5%",
            1,
            DiscountType::Percentage,
            500,
            vec![],
        ),
        rule(
            "demo-gold-10",
            "Gold members 10%",
            20,
            DiscountType::Percentage,
            1000,
            vec![RuleCondition::CustomerTier {
                tier: "gold".to_string(),
            }],
        ),
        rule(
            "demo-six-pack",
            "Six or more, $1.50 off",
            10,
            DiscountType::FixedAmount,
            150,
            vec![RuleCondition::MinQuantity { quantity: 6 }],
        ),
        rule(
            "demo-big-basket",
            "$5 off baskets over $50",
            5,
            DiscountType::FixedAmount,
            500,
            vec![RuleCondition::MinCartSpend { cents: 5000 }],
        ),
        rule(
            "demo-opening-week",
            "Opening week freebie",
            30,
            DiscountType::FreeItem,
            0,
            vec![
                RuleCondition::Branch {
                    branch_id: branch_id.to_string(),
                },
                RuleCondition::DateWindow {
                    from: now,
                    to: now + Duration::days(7),
                },
                RuleCondition::MinQuantity { quantity: 10 },
            ],
        ),
    ]
}
