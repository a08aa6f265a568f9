//! Initialize chain command.

use super::common::{config_path, open_storage, save_keypair};
use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use powchain_chain::config::{DEFAULT_DIFFICULTY, DEFAULT_REWARD_PER_TX};
use powchain_chain::{ChainConfig, Ledger};
use powchain_core::Keypair;
use std::fs;
use std::path::PathBuf;

#[derive(Args)]
pub struct InitArgs {
    /// Directory to store blockchain data
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Leading zero bits required of every block hash
    #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: u8,

    /// Coinbase reward per included transaction
    #[arg(long, default_value_t = DEFAULT_REWARD_PER_TX)]
    reward: u64,

    /// Mining worker threads (0 uses every available core)
    #[arg(long, default_value = "0")]
    workers: usize,

    /// Skip generating the admin key allowed to mint coins
    #[arg(long)]
    no_admin: bool,
}

pub fn run(args: InitArgs) -> Result<()> {
    println!("{}", "Initializing powchain...".bold().cyan());
    println!();

    let config_file = config_path(&args.data_dir);
    if config_file.exists() {
        bail!(
            "Chain already initialized at {}",
            args.data_dir.display()
        );
    }

    fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", args.data_dir))?;
    println!("{}  Created data directory", "✓".green().bold());

    println!();
    println!("{}", "Generating keys...".bold());

    let miner = Keypair::generate();
    let key_file = save_keypair(&args.data_dir, "miner", &miner)?;
    println!("  Miner: {}", miner.address().to_hex().bright_yellow());
    println!(
        "{}  Saved miner keypair to: {}",
        "✓".green().bold(),
        key_file.display().to_string().bright_black()
    );

    let admin = if args.no_admin {
        None
    } else {
        let admin = Keypair::generate();
        let key_file = save_keypair(&args.data_dir, "admin", &admin)?;
        println!("  Admin: {}", admin.address().to_hex().bright_yellow());
        println!(
            "{}  Saved admin keypair to: {}",
            "✓".green().bold(),
            key_file.display().to_string().bright_black()
        );
        Some(admin.address())
    };

    let mut config = ChainConfig {
        difficulty: args.difficulty,
        reward_per_tx: args.reward,
        miner_address: Some(miner.address()),
        privileged_key: admin,
        ..ChainConfig::default()
    };
    config.pow.workers = args.workers;

    config
        .save(&config_file)
        .with_context(|| format!("Failed to write {}", config_file.display()))?;
    println!(
        "{}  Saved config to: {}",
        "✓".green().bold(),
        config_file.display().to_string().bright_black()
    );

    let storage = open_storage(&args.data_dir)?;
    let ledger = Ledger::open(&storage, config).context("Failed to initialize ledger")?;
    storage.flush()?;

    println!();
    println!("{}  Created genesis block", "✓".green().bold());
    println!("    Hash:       {}", ledger.head().to_hex().bright_yellow());
    println!(
        "    Difficulty: {}",
        args.difficulty.to_string().bright_cyan()
    );

    println!();
    println!("{}", "Chain initialized successfully!".green().bold());
    println!();
    println!("Next steps:");
    println!(
        "  • Use {} to create accounts",
        "powchain account new".bright_cyan()
    );
    if !args.no_admin {
        println!(
            "  • Use {} to mint coins",
            "powchain tx send --from admin".bright_cyan()
        );
    }
    println!(
        "  • Use {} to mine pending transactions",
        "powchain block mine".bright_cyan()
    );

    Ok(())
}
