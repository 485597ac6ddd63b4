use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use regiontag::tag::file::read_region_file;
use regiontag::{Compound, RegionKey, Tag};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "regiontag")]
#[command(about = "Inspect region tag files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every chunk of a region file
    Dump { file: PathBuf },
    /// Summarize every region file of a directory
    Stats {
        directory: PathBuf,
        #[arg(long, default_value = "dat")]
        ext: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Dump { file } => dump(&file),
        Command::Stats { directory, ext } => stats(&directory, &ext),
    }
}

fn dump(file: &Path) -> Result<()> {
    let region = read_region_file(file)
        .with_context(|| format!("Failed to read region file '{}'", file.display()))?;

    let mut chunks: Vec<_> = region.chunks().collect();
    chunks.sort_by_key(|(local, _)| (local.x, local.z));

    println!("{}: {} chunk(s)", file.display(), chunks.len());
    for (local, chunk) in chunks {
        println!(
            "chunk {},{} ({} blocks, {} entities)",
            local.x,
            local.z,
            chunk.block_count(),
            chunk.entity_count()
        );

        let mut blocks: Vec<_> = chunk.blocks().collect();
        blocks.sort_by_key(|(key, _)| (key.x, key.y, key.z));
        for (key, tag) in blocks {
            println!("  block {}", key);
            print_compound(tag, 2);
        }

        let mut entities: Vec<_> = chunk.entities().collect();
        entities.sort_by_key(|(id, _)| **id);
        for (id, tag) in entities {
            println!("  entity {}", id);
            print_compound(tag, 2);
        }

        if !chunk.chunk_compound().is_empty() {
            println!("  chunk data");
            print_compound(chunk.chunk_compound(), 2);
        }
    }
    Ok(())
}

fn print_compound(compound: &Compound, indent: usize) {
    for (name, tag) in compound {
        print_tag(Some(name.as_str()), tag, indent);
    }
}

fn print_tag(name: Option<&str>, tag: &Tag, indent: usize) {
    let pad = "  ".repeat(indent);
    let label = match name {
        Some(name) => format!("{}{}: ", pad, name),
        None => format!("{}- ", pad),
    };

    match tag {
        Tag::Compound(child) => {
            println!("{}{{{} entries}}", label, child.len());
            print_compound(child, indent + 1);
        }
        Tag::List(list) => {
            println!("{}[{} x {}]", label, list.len(), list.element_type().name());
            for item in list.iter() {
                print_tag(None, item, indent + 1);
            }
        }
        Tag::String(value) => println!("{}{:?}", label, value),
        Tag::ByteArray(values) => println!("{}{:?}", label, values),
        Tag::IntArray(values) => println!("{}{:?}", label, values),
        Tag::LongArray(values) => println!("{}{:?}", label, values),
        Tag::Byte(v) => println!("{}{}b", label, v),
        Tag::Short(v) => println!("{}{}s", label, v),
        Tag::Int(v) => println!("{}{}", label, v),
        Tag::Long(v) => println!("{}{}L", label, v),
        Tag::Float(v) => println!("{}{}f", label, v),
        Tag::Double(v) => println!("{}{}d", label, v),
    }
}

fn stats(directory: &Path, ext: &str) -> Result<()> {
    if !directory.is_dir() {
        bail!("'{}' is not a directory", directory.display());
    }

    let mut regions = Vec::new();
    for entry in fs::read_dir(directory)
        .with_context(|| format!("Failed to list '{}'", directory.display()))?
    {
        let entry = entry?;
        let name = entry.file_name();
        let Some(key) = name.to_str().and_then(|n| RegionKey::parse_file_name(n, ext)) else {
            continue;
        };
        regions.push((key, entry.path()));
    }
    regions.sort_by_key(|(key, _)| (key.x, key.z));

    let mut unreadable = 0;
    for (key, path) in &regions {
        match read_region_file(path) {
            Ok(region) => {
                let (blocks, entities) = region.chunks().fold((0, 0), |(b, e), (_, chunk)| {
                    (b + chunk.block_count(), e + chunk.entity_count())
                });
                println!(
                    "{}: {} chunks, {} blocks, {} entities",
                    key,
                    region.chunk_count(),
                    blocks,
                    entities
                );
            }
            Err(e) => {
                unreadable += 1;
                println!("{}: unreadable ({})", key, e);
            }
        }
    }

    println!("{} region file(s), {} unreadable", regions.len(), unreadable);
    Ok(())
}
