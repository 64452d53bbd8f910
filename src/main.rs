//! molvault CLI
//!
//! Build and query molecule descriptor stores.
//!
//! # Usage
//!
//! ```bash
//! # Build a store from a SMILES file (smiles in column 0, name in column 1)
//! molvault build --input mols.smi --store mols.mvs --descriptors Basic2D,Mass
//!
//! # Look a molecule up by name or by structural key
//! molvault lookup --store mols.mvs --name aspirin
//! molvault lookup --store mols.mvs --key QWERTYUIOPASDF-ZXCVBNMLKJ-N --json
//!
//! # Check every artifact against its recorded checksum
//! molvault verify --store mols.mvs
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use molvault::config::{default_batch_size, parse_descriptor_list};
use molvault::{standard_registry, BuildOptions, InputFormat, MolStore, SmilesCodec, StoreBuilder};

#[derive(Parser)]
#[command(name = "molvault")]
#[command(about = "A persistent, indexed descriptor store for molecules")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a store from a delimited SMILES file
    Build {
        /// Input file
        #[arg(short, long)]
        input: PathBuf,

        /// Store directory to create
        #[arg(short, long)]
        store: PathBuf,

        /// Comma-separated generator names, concatenated in order
        #[arg(short, long, default_value = molvault::config::DEFAULT_DESCRIPTORS)]
        descriptors: String,

        /// Rows per flush (defaults to $MOLVAULT_BATCH_SIZE or 1000)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Skip the first line
        #[arg(long)]
        has_header: bool,

        /// Field index of the SMILES text
        #[arg(long, default_value = "0")]
        smiles_column: usize,

        /// Field index of the name
        #[arg(long, default_value = "1")]
        name_column: usize,

        /// Name rows by their ordinal instead of a column
        #[arg(long)]
        no_name_column: bool,

        /// Field separator (`tab` or `\t` for tabs); default splits on whitespace
        #[arg(long)]
        separator: Option<String>,

        /// Do not build the structural key index
        #[arg(long)]
        no_structure_index: bool,

        /// Descriptor worker threads
        #[arg(long)]
        threads: Option<usize>,

        /// Replace an existing store
        #[arg(long)]
        overwrite: bool,
    },

    /// Display statistics about a store
    Stats {
        #[arg(short, long)]
        store: PathBuf,
    },

    /// Find rows by name or structural key
    #[command(group(ArgGroup::new("by").required(true).args(["name", "key"])))]
    Lookup {
        #[arg(short, long)]
        store: PathBuf,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        key: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print one row by ordinal
    Row {
        #[arg(short, long)]
        store: PathBuf,

        #[arg(short, long)]
        ordinal: u64,
    },

    /// Re-hash every artifact and compare with the manifest
    Verify {
        #[arg(short, long)]
        store: PathBuf,
    },

    /// List the available descriptor generators
    Generators,
}

fn parse_separator(raw: Option<String>) -> Option<String> {
    raw.map(|s| match s.as_str() {
        "tab" | "\\t" => "\t".to_string(),
        _ => s,
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            store,
            descriptors,
            batch_size,
            has_header,
            smiles_column,
            name_column,
            no_name_column,
            separator,
            no_structure_index,
            threads,
            overwrite,
        } => {
            let options = BuildOptions {
                input: InputFormat {
                    has_header,
                    smiles_column,
                    name_column: (!no_name_column).then_some(name_column),
                    separator: parse_separator(separator),
                },
                batch_size: batch_size.unwrap_or_else(default_batch_size),
                descriptors: parse_descriptor_list(&descriptors),
                index_structures: !no_structure_index,
                threads,
                overwrite,
            };

            let builder = StoreBuilder::new(options, SmilesCodec, standard_registry()?);
            let report = builder
                .build(&input, &store)
                .with_context(|| format!("building {:?} from {:?}", store, input))?;

            println!("Store: {:?}", store);
            println!("  Rows: {}", report.rows);
            println!("  Width: {}", report.width);
            println!("  Skipped rows: {}", report.skipped);
            for sample in &report.skipped_samples {
                println!("    line {}: {}", sample.line_no, sample.reason);
            }
            println!("  Duplicate names: {}", report.duplicate_names);
            for dup in &report.duplicate_samples {
                println!("    {:?}: kept row {}, row {} unnamed", dup.key, dup.kept, dup.dropped);
            }
            if let Some(keys) = report.distinct_structures {
                println!("  Distinct structures: {}", keys);
            }
            println!("  Elapsed: {:.2?}", report.elapsed);
        }

        Commands::Stats { store } => {
            let handle = MolStore::open(&store).with_context(|| format!("opening {:?}", store))?;
            let manifest = handle.manifest();
            println!("Store: {:?}", store);
            println!("  Rows: {}", manifest.row_count);
            println!("  Width: {}", manifest.width);
            println!("  Generators: {}", handle.schema().generator_names().join(", "));
            println!("  Distinct names: {}", manifest.distinct_names);
            match manifest.distinct_structures {
                Some(keys) => println!("  Structure index: {} keys", keys),
                None => println!("  Structure index: disabled"),
            }
            println!("  Skipped rows at build: {}", manifest.skipped_rows);
            println!("  Duplicate names at build: {}", manifest.duplicate_names);
            println!("  Batch size: {}", manifest.options.batch_size);
            let bytes: u64 = manifest.artifacts.iter().map(|a| a.size_bytes).sum();
            println!("  Size: {:.2} MB", bytes as f64 / (1024.0 * 1024.0));
        }

        Commands::Lookup {
            store,
            name,
            key,
            json,
        } => {
            let handle = MolStore::open(&store).with_context(|| format!("opening {:?}", store))?;
            let ordinals = match (&name, &key) {
                (Some(name), _) => vec![handle.lookup_name(name)?],
                (None, Some(key)) => handle.lookup_structural_key(key)?,
                (None, None) => bail!("one of --name or --key is required"),
            };

            if json {
                let rows = ordinals
                    .iter()
                    .map(|&ordinal| -> anyhow::Result<serde_json::Value> {
                        let fields: serde_json::Map<String, serde_json::Value> = handle
                            .labeled_row(ordinal)?
                            .into_iter()
                            .map(|(field, value)| (field, serde_json::json!(value)))
                            .collect();
                        Ok(serde_json::json!({
                            "ordinal": ordinal,
                            "name": handle.name_at(ordinal)?,
                            "descriptors": fields,
                        }))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?;
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for ordinal in ordinals {
                    println!("{}\t{}", ordinal, handle.name_at(ordinal)?);
                    for (field, value) in handle.labeled_row(ordinal)? {
                        println!("  {} = {}", field, value);
                    }
                }
            }
        }

        Commands::Row { store, ordinal } => {
            let handle = MolStore::open(&store).with_context(|| format!("opening {:?}", store))?;
            let mol = handle.entity_at(ordinal, &SmilesCodec)?;
            println!("Row {}: {}", ordinal, handle.name_at(ordinal)?);
            println!("  Formula: {}", mol.formula());
            println!("  Structural key: {}", molvault_chem::structural_key(&mol));
            for (field, value) in handle.labeled_row(ordinal)? {
                println!("  {} = {}", field, value);
            }
        }

        Commands::Verify { store } => {
            let handle = MolStore::open(&store).with_context(|| format!("opening {:?}", store))?;
            handle
                .verify()
                .with_context(|| format!("verifying {:?}", store))?;
            println!(
                "Store {:?} OK ({} rows, {} artifacts)",
                store,
                handle.row_count(),
                handle.manifest().artifacts.len()
            );
        }

        Commands::Generators => {
            let registry = standard_registry()?;
            for name in registry.names() {
                if let Some(generator) = registry.get(name) {
                    println!("{} ({})", name, generator.arity());
                    for field in generator.field_names() {
                        println!("  {}", field);
                    }
                }
            }
        }
    }

    Ok(())
}
