//! Account management command.

use super::common::{list_keypairs, load_config, open_storage, resolve_address, save_keypair};
use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use powchain_chain::Ledger;
use powchain_core::Keypair;
use std::path::PathBuf;

#[derive(Args)]
pub struct AccountArgs {
    #[command(subcommand)]
    command: AccountCommand,
}

#[derive(Subcommand)]
enum AccountCommand {
    /// Generate a new keypair
    New {
        /// Directory to store blockchain data
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Name for the keypair file
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Sum the unspent outputs owned by an account
    Balance {
        /// Directory to store blockchain data
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,

        /// Key name or hex address
        address: String,
    },
    /// List all keypairs
    List {
        /// Directory to store blockchain data
        #[arg(short, long, default_value = "./data")]
        data_dir: PathBuf,
    },
}

pub fn run(args: AccountArgs) -> Result<()> {
    match args.command {
        AccountCommand::New { data_dir, name } => new_keypair(data_dir, name),
        AccountCommand::Balance { data_dir, address } => check_balance(data_dir, address),
        AccountCommand::List { data_dir } => show_keypairs(data_dir),
    }
}

fn new_keypair(data_dir: PathBuf, name: Option<String>) -> Result<()> {
    let keypair = Keypair::generate();
    let address = keypair.address();
    let name = name.unwrap_or_else(|| address.to_hex()[..16].to_string());

    let key_file = save_keypair(&data_dir, &name, &keypair)?;

    println!("{}", "Generated new keypair:".bold().cyan());
    println!();
    println!("  Name:    {}", name.bright_cyan());
    println!("  Address: {}", address.to_hex().bright_yellow());
    println!();
    println!(
        "{}  Saved keypair to: {}",
        "✓".green().bold(),
        key_file.display().to_string().bright_black()
    );

    Ok(())
}

fn check_balance(data_dir: PathBuf, name_or_hex: String) -> Result<()> {
    let address = resolve_address(&data_dir, &name_or_hex)?;
    let config = load_config(&data_dir)?;
    let storage = open_storage(&data_dir)?;
    let ledger = Ledger::open(&storage, config)?;

    let balance = ledger.balance(&address)?;

    println!();
    println!("  Address: {}", address.to_hex().bright_yellow());
    println!("  Balance: {}", balance.to_string().bright_cyan());
    println!();

    Ok(())
}

fn show_keypairs(data_dir: PathBuf) -> Result<()> {
    let keys = list_keypairs(&data_dir)?;

    if keys.is_empty() {
        println!("{}", "No keypairs found.".yellow());
        println!(
            "Use {} to create a new keypair.",
            "powchain account new".bright_cyan()
        );
        return Ok(());
    }

    println!("{}", "Saved Keypairs:".bold().cyan());
    println!();
    for (name, address) in keys {
        println!(
            "  {} {}",
            format!("{}:", name).bright_black(),
            address.bright_yellow()
        );
    }
    println!();

    Ok(())
}
