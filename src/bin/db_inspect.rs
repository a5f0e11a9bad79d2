//! CLI tool for inspecting instance databases.
//!
//! Displays per-class record counts, difficulty histograms and
//! point-count quartiles for a serialized ground-truth database.
//!
//! # Usage
//!
//! ```bash
//! db_inspect kitti/db_info.json
//! db_inspect kitti/db_info.json --class Car --min-points 5
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;

use clap::Parser;

use bija_aug::{InstanceRecord, Result};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serialized database source (JSON)
    info_path: PathBuf,

    /// Restrict the report to one class
    #[arg(short, long)]
    class: Option<String>,

    /// Ignore records with fewer points
    #[arg(long, default_value = "0")]
    min_points: u32,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let text = fs::read_to_string(&args.info_path)?;
    let info: HashMap<String, Vec<InstanceRecord>> = serde_json::from_str(&text)?;
    // sorted for a stable report
    let info: BTreeMap<String, Vec<InstanceRecord>> = info.into_iter().collect();

    println!("Instance Database Information");
    println!("=============================");
    println!("Source: {}", args.info_path.display());
    println!();

    let mut total_records = 0usize;
    let mut total_classes = 0usize;

    for (class, records) in &info {
        if let Some(only) = &args.class {
            if only != class {
                continue;
            }
        }
        let records: Vec<&InstanceRecord> = records
            .iter()
            .filter(|r| r.num_points_in_gt >= args.min_points)
            .collect();
        total_records += records.len();
        total_classes += 1;

        println!("{}: {} records", class, records.len());
        if records.is_empty() {
            println!();
            continue;
        }

        let mut histogram: BTreeMap<i32, usize> = BTreeMap::new();
        for r in &records {
            *histogram.entry(r.difficulty).or_default() += 1;
        }
        let breakdown: Vec<String> = histogram
            .iter()
            .map(|(d, n)| format!("{}: {}", d, n))
            .collect();
        println!("  Difficulty: {}", breakdown.join(", "));

        let mut counts: Vec<u32> = records.iter().map(|r| r.num_points_in_gt).collect();
        counts.sort_unstable();
        println!(
            "  Points per record: min {}, q1 {}, median {}, q3 {}, max {}",
            counts[0],
            counts[counts.len() / 4],
            counts[counts.len() / 2],
            counts[counts.len() * 3 / 4],
            counts[counts.len() - 1]
        );
        println!();
    }

    println!(
        "Total: {} records across {} classes",
        total_records, total_classes
    );
    Ok(())
}
