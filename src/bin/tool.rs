//! sectorkv Maintenance Tool
//!
//! Inspect and modify a store kept in a file-backed flash image.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sectorkv::{FileFlash, Flash, FlashParameters, Store, StoreConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// sectorkv Tool
#[derive(Parser, Debug)]
#[command(name = "sectorkv-tool")]
#[command(about = "Maintenance tool for sectorkv flash images")]
#[command(version)]
struct Args {
    /// Flash image file
    #[arg(short, long)]
    image: PathBuf,

    /// Sector size in bytes
    #[arg(short, long, default_value = "4096", value_parser = clap::value_parser!(u32).range(1..))]
    sector_size: u32,

    /// Lookup cache buckets (0 disables the cache)
    #[arg(long, default_value = "128")]
    cache: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a blank image and format it
    Create {
        /// Image size in bytes
        #[arg(long, default_value = "12288")]
        size: u64,

        /// Program granularity in bytes
        #[arg(long, default_value = "4")]
        write_block_size: usize,

        /// Erase granularity in bytes
        #[arg(long, default_value = "4096")]
        erase_page_size: usize,
    },

    /// Store a value
    Write {
        /// Key (decimal or 0x hex)
        #[arg(value_parser = parse_key)]
        key: u32,

        /// Value bytes (UTF-8)
        value: String,
    },

    /// Print the latest value of a key
    Read {
        #[arg(value_parser = parse_key)]
        key: u32,
    },

    /// Print an older version of a key
    History {
        #[arg(value_parser = parse_key)]
        key: u32,

        /// How many versions to go back
        versions_back: u32,
    },

    /// Delete a key
    Delete {
        #[arg(value_parser = parse_key)]
        key: u32,
    },

    /// Report free space
    Free,

    /// Close the active sector and collect the next one
    Rotate,

    /// Wipe the store and format it again
    Clear,
}

fn parse_key(raw: &str) -> Result<u32, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|e| format!("invalid key '{raw}': {e}"))
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sectorkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::debug!("sectorkv-tool v{}", sectorkv::VERSION);

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> sectorkv::Result<()> {
    let flash = match &args.command {
        Commands::Create {
            size,
            write_block_size,
            erase_page_size,
        } => {
            let params = FlashParameters {
                write_block_size: *write_block_size,
                erase_page_size: *erase_page_size,
                ..FlashParameters::nor()
            };
            FileFlash::create(&args.image, *size, params)?
        }
        _ => FileFlash::open(&args.image)?,
    };

    let config = StoreConfig::builder()
        .sector_size(args.sector_size)
        .sector_count((flash.size() / u64::from(args.sector_size)) as u32)
        .lookup_cache_size(args.cache)
        .build();
    let store = Store::mount(flash, config)?;

    match args.command {
        Commands::Create { .. } => {
            println!(
                "Formatted {} ({} sectors)",
                args.image.display(),
                store.config().sector_count
            );
        }
        Commands::Write { key, value } => {
            let written = store.write(key, value.as_bytes())?;
            if written == 0 {
                println!("Unchanged");
            } else {
                println!("Wrote {written} bytes");
            }
        }
        Commands::Read { key } => {
            let value = store.read_value(key)?;
            println!("{}", String::from_utf8_lossy(&value));
        }
        Commands::History { key, versions_back } => {
            let mut buf = vec![0u8; store.config().sector_size as usize];
            let n = store.read_history(key, &mut buf, versions_back)?;
            println!("{}", String::from_utf8_lossy(&buf[..n]));
        }
        Commands::Delete { key } => {
            store.delete(key)?;
            println!("Deleted");
        }
        Commands::Free => {
            println!("Free space:          {} bytes", store.calc_free_space()?);
            println!("Active sector space: {} bytes", store.active_sector_free_space()?);
        }
        Commands::Rotate => {
            store.force_sector_rotation()?;
            println!("Rotated");
        }
        Commands::Clear => {
            store.clear()?;
            store.remount()?;
            println!("Cleared");
        }
    }

    store.into_device().sync()?;
    Ok(())
}
