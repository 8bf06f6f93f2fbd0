//! List the content of a ROOT file: keys, trees and streamer infos
//!
//! Run with: cargo run --example root_ls --features cli -- events.root --trees

use std::time::Instant;

use clap::Parser;
use rootio::{Directory, File};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "List the keys, trees and streamers of a ROOT file", long_about = None)]
struct Cli {
    /// ROOT file to inspect
    path: String,

    /// Show the branches of every tree
    #[arg(long)]
    trees: bool,

    /// Show the streamer infos stored in the file
    #[arg(long)]
    streamers: bool,

    /// Print a JSON document instead of text
    #[arg(long)]
    json: bool,
}

fn dir_json(file: &File, dir: Directory<'_>, trees: bool) -> rootio::Result<Value> {
    let mut keys = Vec::new();
    for key in dir.keys() {
        let mut entry = json!({
            "name": key.name(),
            "cycle": key.cycle(),
            "class": key.class(),
            "title": key.title(),
            "nbytes": key.nbytes(),
            "objlen": key.objlen(),
        });
        if key.class() == "TTree" && trees {
            let tree = rootio::Tree::try_from(key.object(file)?)?;
            let branches: Vec<Value> = tree
                .branches()
                .iter()
                .map(|b| {
                    let base = b.base();
                    json!({
                        "name": base.name(),
                        "title": base.title(),
                        "leaves": base.leaves().iter().map(|l| l.class.clone()).collect::<Vec<_>>(),
                        "baskets": base.basket_seek.len(),
                        "zip_bytes": base.zip_bytes,
                    })
                })
                .collect();
            entry["entries"] = json!(tree.entries());
            entry["branches"] = json!(branches);
        }
        keys.push(entry);
    }
    let mut dirs = serde_json::Map::new();
    for sub in dir.dirs() {
        dirs.insert(sub.name().to_owned(), dir_json(file, sub, trees)?);
    }
    Ok(json!({ "keys": keys, "dirs": dirs }))
}

fn print_dir(file: &File, dir: Directory<'_>, depth: usize, trees: bool) -> rootio::Result<()> {
    let pad = "  ".repeat(depth);
    for key in dir.keys() {
        println!(
            "{pad}{:<24} {:<16} cycle {:<3} {:>10} bytes  {}",
            key.name(),
            key.class(),
            key.cycle(),
            key.nbytes(),
            key.title()
        );
        if key.class() == "TTree" && trees {
            let tree = rootio::Tree::try_from(key.object(file)?)?;
            println!("{pad}  {} entries", tree.entries());
            for b in tree.branches() {
                let base = b.base();
                println!(
                    "{pad}  - {:<20} {:<24} {} baskets, {} bytes",
                    base.name(),
                    base.title(),
                    base.basket_seek.len(),
                    base.zip_bytes
                );
            }
        }
        if let Ok(sub) = dir.dir(key.name()) {
            if key.class() == "TDirectory" || key.class() == "TDirectoryFile" {
                print_dir(file, sub, depth + 1, trees)?;
            }
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let start = Instant::now();
    let file = File::open(&cli.path)?;
    let open_time = start.elapsed();

    if cli.json {
        let mut doc = dir_json(&file, file.root(), cli.trees)?;
        doc["version"] = json!(file.version());
        doc["end"] = json!(file.header().end);
        if cli.streamers {
            doc["streamers"] = json!(file
                .streamer_infos()
                .map(|info| json!({
                    "class": info.name,
                    "version": info.class_version,
                    "checksum": info.checksum,
                }))
                .collect::<Vec<_>>());
        }
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!(
        "{} (version {}, {} bytes, opened in {:.3}ms)",
        cli.path,
        file.version(),
        file.header().end,
        open_time.as_secs_f64() * 1000.0
    );
    print_dir(&file, file.root(), 0, cli.trees)?;

    if cli.streamers {
        println!("\nStreamer infos:");
        for info in file.streamer_infos() {
            println!(
                "  {:<24} version {:<3} checksum {:#010x}  {} elements",
                info.name,
                info.class_version,
                info.checksum,
                info.elements.len()
            );
        }
    }
    Ok(())
}
