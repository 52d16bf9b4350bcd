use std::path::PathBuf;
use std::process::ExitCode;

use arbor::common::{BufferPoolConfig, ReplacementPolicy, DEFAULT_BTREE_ORDER};
use arbor::index::BTreeIndex;
use arbor::tuple::{DataType, Value};
use arbor::{PageId, RecordId, Result, SlotId};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[clap(author, version, about = "Page cache and B+Tree index tool", long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an empty index file
    Create {
        path: PathBuf,
        #[clap(long, default_value = "integer", help = "integer|string|float|boolean")]
        key_type: DataType,
        #[clap(long, default_value_t = DEFAULT_BTREE_ORDER)]
        order: usize,
    },
    /// Insert a key with its record locator
    Insert {
        path: PathBuf,
        key: String,
        page: u32,
        slot: u16,
    },
    /// Look up the record locator of a key
    Find { path: PathBuf, key: String },
    /// Remove a key
    Delete { path: PathBuf, key: String },
    /// Print every entry in key order
    Scan { path: PathBuf },
    /// Print the tree level by level
    Print { path: PathBuf },
    /// Remove an index file
    Destroy { path: PathBuf },
    /// Build an index from a key list and report tree and pool statistics
    Demo {
        path: PathBuf,
        #[clap(long, default_value_t = 3)]
        order: usize,
        #[clap(long, default_value = "lru", help = "lru|fifo")]
        policy: ReplacementPolicy,
        #[clap(long, default_value = "integer")]
        key_type: DataType,
        #[clap(long, value_delimiter = ',', default_value = "10,20,5,6,12,30,7,17")]
        keys: Vec<String>,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Create {
            path,
            key_type,
            order,
        } => {
            BTreeIndex::create(&path, key_type, order)?;
            println!("created {} ({} keys, order {})", path.display(), key_type, order);
        }
        Command::Insert {
            path,
            key,
            page,
            slot,
        } => {
            let mut index = BTreeIndex::open(&path)?;
            let key = Value::parse_as(&key, index.key_type())?;
            index.insert(key, RecordId::new(PageId::new(page), SlotId::new(slot)))?;
            index.close()?;
        }
        Command::Find { path, key } => {
            let index = BTreeIndex::open(&path)?;
            let key = Value::parse_as(&key, index.key_type())?;
            println!("{}", index.search(&key)?);
            index.close()?;
        }
        Command::Delete { path, key } => {
            let mut index = BTreeIndex::open(&path)?;
            let key = Value::parse_as(&key, index.key_type())?;
            index.delete(&key)?;
            index.close()?;
        }
        Command::Scan { path } => {
            let index = BTreeIndex::open(&path)?;
            for (key, rid) in index.open_scan() {
                println!("{}\t{}", key, rid);
            }
            index.close()?;
        }
        Command::Print { path } => {
            let index = BTreeIndex::open(&path)?;
            print!("{}", index.print_tree());
            index.close()?;
        }
        Command::Destroy { path } => {
            BTreeIndex::delete_index(&path)?;
            println!("deleted {}", path.display());
        }
        Command::Demo {
            path,
            order,
            policy,
            key_type,
            keys,
        } => demo(path, order, policy, key_type, &keys)?,
    }
    Ok(())
}

fn demo(
    path: PathBuf,
    order: usize,
    policy: ReplacementPolicy,
    key_type: DataType,
    keys: &[String],
) -> Result<()> {
    BTreeIndex::create(&path, key_type, order)?;
    let config = BufferPoolConfig {
        policy,
        ..BufferPoolConfig::default()
    };
    let mut index = BTreeIndex::open_with_config(&path, config)?;

    for (i, raw) in keys.iter().enumerate() {
        let key = Value::parse_as(raw.trim(), key_type)?;
        index.insert(key, RecordId::new(PageId::new(i as u32 + 1), SlotId::new(0)))?;
    }

    println!("Tree:");
    print!("{}", index.print_tree());

    let scanned: Vec<String> = index.open_scan().map(|(key, _)| key.to_string()).collect();
    println!("\nScan: {}", scanned.join(", "));
    println!(
        "Nodes: {}, entries: {}, key type: {}",
        index.num_nodes(),
        index.num_entries(),
        index.key_type()
    );

    let bpm = index.buffer_pool();
    println!(
        "\nBuffer pool: {} frames ({}), {} reads, {} writes",
        bpm.pool_size(),
        bpm.policy(),
        bpm.num_read_io(),
        bpm.num_write_io()
    );

    index.close()?;
    println!("Closed {}", path.display());
    Ok(())
}
