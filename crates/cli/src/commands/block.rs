//! Block operations command.

use super::common::{load_config, open_storage, resolve_address};
use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use powchain_chain::{Ledger, LedgerError};
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use powchain_consensus::{CancelToken, CpuMiner};
use powchain_core::{leading_zero_bits, Block, BlockHeader, Hash};
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Args)]
pub struct BlockArgs {
    #[command(subcommand)]
    command: BlockCommand,
}

#[derive(Subcommand)]
enum BlockCommand {
    /// Mine pending transactions into a new block on top of the head
    Mine {
        /// Directory to store blockchain data
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Transaction hash to include (repeatable); defaults to the pending pool
        #[arg(short, long = "tx")]
        txs: Vec<String>,

        /// Maximum pending transactions to include when no hash is given
        #[arg(short, long, default_value = "100")]
        max: usize,

        /// Key name or hex address paid by the coinbase (overrides config)
        #[arg(long)]
        miner: Option<String>,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Also write the mined block as JSON for another node
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Validate a JSON block file and apply it
    Import {
        /// Directory to store blockchain data
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Path to the block JSON
        file: PathBuf,
    },
    /// Show the current chain head
    Head {
        /// Directory to store blockchain data
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,
    },
    /// Show detailed block information
    Info {
        /// Directory to store blockchain data
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Block hash (hex format)
        hash: String,
    },
    /// List recent blocks
    List {
        /// Directory to store blockchain data
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Number of blocks to show
        #[arg(short, long, default_value = "10")]
        count: usize,
    },
}

pub fn run(args: BlockArgs) -> Result<()> {
    match args.command {
        BlockCommand::Mine {
            data_dir,
            txs,
            max,
            miner,
            timeout,
            out,
        } => mine(data_dir, txs, max, miner, timeout, out),
        BlockCommand::Import { data_dir, file } => import(data_dir, file),
        BlockCommand::Head { data_dir } => show_head(data_dir),
        BlockCommand::Info { data_dir, hash } => show_block_info(data_dir, hash),
        BlockCommand::List { data_dir, count } => list_blocks(data_dir, count),
    }
}

fn mine(
    data_dir: PathBuf,
    txs: Vec<String>,
    max: usize,
    miner: Option<String>,
    timeout: Option<u64>,
    out: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(&data_dir)?;
    let storage = open_storage(&data_dir)?;
    let mut ledger = Ledger::open(&storage, config)?;

    if let Some(miner) = miner {
        ledger.set_miner_address(resolve_address(&data_dir, &miner)?);
    }

    let tx_hashes = if txs.is_empty() {
        ledger
            .select_pending(max)?
            .into_iter()
            .map(|tx| tx.hash)
            .collect()
    } else {
        txs.iter()
            .map(|s| Hash::from_hex(s).with_context(|| format!("Invalid tx hash: {}", s)))
            .collect::<Result<Vec<_>>>()?
    };

    println!("{}", "Mining block...".bold().cyan());
    println!();
    println!("  Parent:       {}", ledger.head().to_hex().bright_black());
    println!(
        "  Difficulty:   {}",
        ledger.config().difficulty.to_string().bright_cyan()
    );
    println!(
        "  Transactions: {}",
        tx_hashes.len().to_string().bright_cyan()
    );

    let cancel = CancelToken::new();
    if let Some(secs) = timeout {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            cancel.cancel();
        });
    }

    let (candidates, sampled) = channel::bounded(64);
    let progress = thread::spawn(move || report_progress(sampled));

    let started = Instant::now();
    let search = CpuMiner::new(ledger.config().pow.clone());
    let mined = ledger.mine_block_with(&search, &tx_hashes, &cancel, Some(&candidates));
    drop(candidates);
    let _ = progress.join();

    let block = match mined {
        Ok(block) => block,
        Err(LedgerError::Cancelled) => {
            bail!("Mining timed out after {}s", timeout.unwrap_or_default())
        }
        Err(LedgerError::MissingMinerAddress) => {
            bail!("No miner address configured. Pass --miner or set miner_address in config.json")
        }
        Err(e) => return Err(e).context("Failed to mine block"),
    };
    storage.flush()?;

    println!();
    println!(
        "{}  Mined block in {:.2?}",
        "✓".green().bold(),
        started.elapsed()
    );
    println!("    Hash:  {}", block.hash().to_hex().bright_yellow());
    println!(
        "    Nonce: {}",
        block.header.nonce.to_string().bright_cyan()
    );

    if let Some(path) = out {
        fs::write(&path, serde_json::to_string_pretty(&block)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!(
            "{}  Wrote block to: {}",
            "✓".green().bold(),
            path.display().to_string().bright_black()
        );
    }

    println!();
    Ok(())
}

/// Print the closest sampled hash about once a second until the search
/// drops its sender.
fn report_progress(sampled: Receiver<Hash>) {
    let mut best: Option<(u32, Hash)> = None;
    let mut last_report = Instant::now();

    loop {
        match sampled.recv_timeout(Duration::from_millis(200)) {
            Ok(hash) => {
                let zeros = leading_zero_bits(hash.as_bytes());
                if best.map_or(true, |(most, _)| zeros > most) {
                    best = Some((zeros, hash));
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            if let Some((zeros, hash)) = best {
                println!(
                    "  {} {} {}",
                    "…".bright_black(),
                    hash.to_hex().bright_black(),
                    format!("({} zero bits)", zeros).bright_black()
                );
            }
            last_report = Instant::now();
        }
    }
}

fn import(data_dir: PathBuf, file: PathBuf) -> Result<()> {
    let contents = fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let block: Block = serde_json::from_str(&contents)
        .with_context(|| format!("Malformed block JSON: {}", file.display()))?;

    let config = load_config(&data_dir)?;
    let storage = open_storage(&data_dir)?;
    let ledger = Ledger::open(&storage, config)?;

    ledger
        .import_block(&block)
        .with_context(|| format!("Block {} rejected", block.hash()))?;
    storage.flush()?;

    println!(
        "{}  Imported block {} ({} txs)",
        "✓".green().bold(),
        block.hash().to_hex().bright_yellow(),
        block.body.tx_count()
    );

    Ok(())
}

fn show_head(data_dir: PathBuf) -> Result<()> {
    let config = load_config(&data_dir)?;
    let storage = open_storage(&data_dir)?;
    let ledger = Ledger::open(&storage, config)?;

    let head = ledger.head();
    let header = ledger.get_header(&head)?.context("Head header not found")?;

    println!();
    println!("{}", "Chain Head:".bold().cyan());
    println!();
    print_header(&header);
    println!();

    Ok(())
}

fn show_block_info(data_dir: PathBuf, hash: String) -> Result<()> {
    let hash = Hash::from_hex(&hash).with_context(|| format!("Invalid block hash: {}", hash))?;

    let config = load_config(&data_dir)?;
    let storage = open_storage(&data_dir)?;
    let ledger = Ledger::open(&storage, config)?;

    let header = ledger.get_header(&hash)?.context("Block not found")?;
    let body = ledger.get_body(&hash)?.unwrap_or_default();

    println!();
    println!("{}", "Block Information:".bold().cyan());
    println!();
    print_header(&header);
    println!(
        "  Transactions: {}",
        body.tx_count().to_string().bright_cyan()
    );
    println!();

    if let Some(coinbase) = body.coinbase_tx_hash {
        println!("{}", "Coinbase:".bold());
        println!();
        println!("  {}", coinbase.to_hex().bright_yellow());
        println!();
    }

    if !body.tx_hashes.is_empty() {
        println!("{}", "Transactions:".bold());
        println!();
        for (i, tx_hash) in body.tx_hashes.iter().enumerate() {
            println!(
                "  {} {}",
                format!("{}.", i + 1).bright_black(),
                tx_hash.to_hex().bright_yellow()
            );
        }
        println!();
    }

    Ok(())
}

fn list_blocks(data_dir: PathBuf, count: usize) -> Result<()> {
    let config = load_config(&data_dir)?;
    let storage = open_storage(&data_dir)?;
    let ledger = Ledger::open(&storage, config)?;

    println!();
    println!("{}", "Recent Blocks:".bold().cyan());
    println!();

    for header in ledger.recent_headers(count)? {
        let tx_count = ledger
            .get_body(&header.cur_hash)?
            .map(|body| body.tx_count())
            .unwrap_or_default();
        println!(
            "  {} {} {}",
            header.cur_hash.to_hex()[..16].bright_yellow(),
            header.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().bright_black(),
            format!("({} txs)", tx_count).bright_black()
        );
    }

    println!();
    Ok(())
}

fn print_header(header: &BlockHeader) {
    println!("  Hash:         {}", header.cur_hash.to_hex().bright_yellow());
    println!(
        "  Parent Hash:  {}",
        header.prev_hash.to_hex().bright_black()
    );
    println!(
        "  Data Hash:    {}",
        header.data_hash.to_hex().bright_black()
    );
    println!(
        "  Difficulty:   {}",
        header.difficulty.to_string().bright_cyan()
    );
    println!("  Nonce:        {}", header.nonce.to_string().bright_cyan());
    println!(
        "  Timestamp:    {}",
        header.timestamp.to_rfc3339().bright_black()
    );
}
