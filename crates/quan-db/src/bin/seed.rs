//! # Seed Data Generator
//!
//! Populates the database with a small demo restaurant for development.
//!
//! ## Usage
//! ```bash
//! cargo run -p quan-db --bin seed
//!
//! # Specify database path
//! cargo run -p quan-db --bin seed -- --db ./data/quan.db
//! ```
//!
//! ## Generated Data
//! - Tables across two floors plus a garden area
//! - A Vietnamese menu split between the hot kitchen and the bar
//! - Ingredients with stock levels and recipes linking them to dishes
//!
//! Staff accounts are not seeded here; the server creates the bootstrap
//! admin from its configuration.

use std::env;
use quan_db::{Database, DbConfig};

/// (area, table name prefix, count, capacity)
const AREAS: &[(&str, &str, usize, i64)] = &[
    ("Tầng 1", "B", 8, 4),
    ("Tầng 2", "L", 6, 6),
    ("Sân vườn", "SV", 4, 8),
];

/// (name, category, price in dong, station)
const MENU: &[(&str, &str, i64, &str)] = &[
    ("Phở bò tái", "Món nước", 65_000, "bếp nóng"),
    ("Phở gà", "Món nước", 60_000, "bếp nóng"),
    ("Bún chả Hà Nội", "Món nước", 60_000, "bếp nóng"),
    ("Bún bò Huế", "Món nước", 70_000, "bếp nóng"),
    ("Cơm tấm sườn", "Cơm", 55_000, "bếp nóng"),
    ("Cơm rang dưa bò", "Cơm", 65_000, "bếp nóng"),
    ("Chả giò", "Khai vị", 45_000, "bếp nóng"),
    ("Gỏi cuốn", "Khai vị", 40_000, "bếp lạnh"),
    ("Nộm đu đủ", "Khai vị", 45_000, "bếp lạnh"),
    ("Trà đá", "Đồ uống", 5_000, "quầy bar"),
    ("Cà phê sữa đá", "Đồ uống", 29_000, "quầy bar"),
    ("Nước chanh", "Đồ uống", 25_000, "quầy bar"),
    ("Sinh tố bơ", "Đồ uống", 45_000, "quầy bar"),
    ("Bia Hà Nội", "Đồ uống", 20_000, "quầy bar"),
];

/// (name, unit, stock, reorder level)
const INGREDIENTS: &[(&str, &str, i64, i64)] = &[
    ("Bánh phở", "phần", 80, 20),
    ("Thịt bò", "phần", 60, 15),
    ("Thịt gà", "phần", 40, 10),
    ("Bún", "phần", 80, 20),
    ("Sườn", "phần", 30, 10),
    ("Bơ", "quả", 12, 5),
];

/// (menu item, ingredient, quantity per portion)
const RECIPES: &[(&str, &str, i64)] = &[
    ("Phở bò tái", "Bánh phở", 1),
    ("Phở bò tái", "Thịt bò", 1),
    ("Phở gà", "Bánh phở", 1),
    ("Phở gà", "Thịt gà", 1),
    ("Bún chả Hà Nội", "Bún", 1),
    ("Bún bò Huế", "Bún", 1),
    ("Bún bò Huế", "Thịt bò", 1),
    ("Cơm tấm sườn", "Sườn", 1),
    ("Cơm rang dưa bò", "Thịt bò", 1),
    ("Sinh tố bơ", "Bơ", 1),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./quan_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Quan POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./quan_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Quan POS Seed Data Generator");
    println!("===============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.tables().list().await?;
    if !existing.is_empty() {
        println!("⚠ Database already has {} tables", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let mut tables = 0;
    for (area, prefix, count, capacity) in AREAS {
        for n in 1..=*count {
            db.tables()
                .insert(&format!("{}{}", prefix, n), Some(*area), *capacity)
                .await?;
            tables += 1;
        }
    }
    println!("✓ Created {} tables", tables);

    let mut menu_ids = Vec::with_capacity(MENU.len());
    for (name, category, price, station) in MENU {
        let item = db.menu().insert_item(name, category, *price, Some(*station)).await?;
        menu_ids.push((*name, item.id));
    }
    println!("✓ Created {} menu items", menu_ids.len());

    let mut ingredient_ids = Vec::with_capacity(INGREDIENTS.len());
    for (name, unit, stock, reorder) in INGREDIENTS {
        let ingredient = db.menu().insert_ingredient(name, unit, *stock, *reorder).await?;
        ingredient_ids.push((*name, ingredient.id));
    }
    println!("✓ Created {} ingredients", ingredient_ids.len());

    let mut lines = 0;
    for (dish, ingredient, quantity) in RECIPES {
        let menu_id = menu_ids.iter().find(|(n, _)| n == dish).map(|(_, id)| id);
        let ingredient_id = ingredient_ids.iter().find(|(n, _)| n == ingredient).map(|(_, id)| id);
        match (menu_id, ingredient_id) {
            (Some(menu_id), Some(ingredient_id)) => {
                db.menu().set_recipe_line(menu_id, ingredient_id, *quantity).await?;
                lines += 1;
            }
            _ => eprintln!("Skipping recipe line {} / {}", dish, ingredient),
        }
    }
    println!("✓ Created {} recipe lines", lines);

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
