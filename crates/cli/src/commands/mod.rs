//! CLI commands module.

use anyhow::Result;
use clap::Subcommand;

mod account;
mod block;
mod common;
mod init;
mod tx;

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new chain
    Init(init::InitArgs),
    /// Account management
    Account(account::AccountArgs),
    /// Transaction operations
    Tx(tx::TxArgs),
    /// Block operations
    Block(block::BlockArgs),
}

pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Init(args) => init::run(args),
        Commands::Account(args) => account::run(args),
        Commands::Tx(args) => tx::run(args),
        Commands::Block(args) => block::run(args),
    }
}
