//! Transaction command.

use super::common::{load_config, load_keypair, open_storage, resolve_address};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use powchain_chain::Ledger;
use powchain_core::Transaction;
use std::fs;
use std::path::PathBuf;

#[derive(Args)]
pub struct TxArgs {
    #[command(subcommand)]
    command: TxCommand,
}

#[derive(Subcommand)]
enum TxCommand {
    /// Pay coins from a saved keypair and add the transaction to the mempool
    Send {
        /// Directory to store blockchain data
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Sender keypair name (without .json extension)
        #[arg(short, long)]
        from: String,

        /// Recipient key name or hex address
        #[arg(short, long)]
        to: String,

        /// Amount to send
        #[arg(short, long)]
        amount: u64,

        /// Also write the signed transaction as JSON for another node
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Validate a JSON transaction file and add it to the mempool
    Import {
        /// Directory to store blockchain data
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Path to the transaction JSON
        file: PathBuf,
    },
    /// Show transactions waiting in the mempool
    Pending {
        /// Directory to store blockchain data
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Maximum number of transactions to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

pub fn run(args: TxArgs) -> Result<()> {
    match args.command {
        TxCommand::Send {
            data_dir,
            from,
            to,
            amount,
            out,
        } => send(data_dir, from, to, amount, out),
        TxCommand::Import { data_dir, file } => import(data_dir, file),
        TxCommand::Pending { data_dir, limit } => pending(data_dir, limit),
    }
}

fn send(
    data_dir: PathBuf,
    from: String,
    to: String,
    amount: u64,
    out: Option<PathBuf>,
) -> Result<()> {
    println!("{}", "Sending transaction...".bold().cyan());
    println!();

    let keypair = load_keypair(&data_dir, &from)?;
    let dest = resolve_address(&data_dir, &to)?;

    println!("  From:   {}", keypair.address().to_hex().bright_yellow());
    println!("  To:     {}", dest.to_hex().bright_yellow());
    println!("  Amount: {}", amount.to_string().bright_cyan());

    let config = load_config(&data_dir)?;
    let storage = open_storage(&data_dir)?;
    let ledger = Ledger::open(&storage, config)?;

    let tx = ledger
        .create_transaction(&keypair, dest, amount)
        .context("Failed to create transaction")?;
    storage.flush()?;

    println!();
    println!("{}  Transaction added to mempool", "✓".green().bold());
    println!("    Hash:    {}", tx.hash.to_hex().bright_yellow());
    println!(
        "    Inputs:  {}",
        tx.inputs.len().to_string().bright_cyan()
    );
    println!(
        "    Outputs: {}",
        tx.outputs.len().to_string().bright_cyan()
    );

    if let Some(path) = out {
        fs::write(&path, serde_json::to_string_pretty(&tx)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!(
            "{}  Wrote transaction to: {}",
            "✓".green().bold(),
            path.display().to_string().bright_black()
        );
    }

    println!();
    Ok(())
}

fn import(data_dir: PathBuf, file: PathBuf) -> Result<()> {
    let contents = fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let tx: Transaction = serde_json::from_str(&contents)
        .with_context(|| format!("Malformed transaction JSON: {}", file.display()))?;

    let config = load_config(&data_dir)?;
    let storage = open_storage(&data_dir)?;
    let ledger = Ledger::open(&storage, config)?;

    let kind = ledger
        .submit_transaction(&tx)
        .with_context(|| format!("Transaction {} rejected", tx.hash))?;
    storage.flush()?;

    println!(
        "{}  Imported {:?} transaction {}",
        "✓".green().bold(),
        kind,
        tx.hash.to_hex().bright_yellow()
    );

    Ok(())
}

fn pending(data_dir: PathBuf, limit: usize) -> Result<()> {
    let config = load_config(&data_dir)?;
    let storage = open_storage(&data_dir)?;
    let ledger = Ledger::open(&storage, config)?;

    let mempool = ledger.mempool();
    let txs = mempool.get_pending(limit)?;

    println!();
    println!(
        "{} {}",
        "Pending Transactions:".bold().cyan(),
        format!("({} total)", mempool.len()).bright_black()
    );
    println!();

    if txs.is_empty() {
        println!("  {}", "Mempool is empty.".yellow());
    }

    for tx in txs {
        let amount: u64 = tx
            .outputs
            .iter()
            .fold(0u64, |acc, out| acc.saturating_add(out.amount));
        println!(
            "  {} {}",
            tx.hash.to_hex().bright_yellow(),
            format!(
                "({} in, {} out, {} coins)",
                tx.inputs.len(),
                tx.outputs.len(),
                amount
            )
            .bright_black()
        );
    }

    println!();
    Ok(())
}
