//! Helpers shared by the subcommands: data directory layout, key files and
//! configuration.

use anyhow::{bail, Context, Result};
use powchain_chain::ChainConfig;
use powchain_core::{Address, Keypair};
use powchain_storage::Storage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Keypair file stored under `<data_dir>/keys/<name>.json`.
#[derive(Debug, Serialize, Deserialize)]
pub struct KeyFile {
    pub address: String,
    pub private_key: String,
}

pub fn keys_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("keys")
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.json")
}

pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("db")
}

/// Write a keypair to `keys/<name>.json`, refusing to overwrite.
pub fn save_keypair(data_dir: &Path, name: &str, keypair: &Keypair) -> Result<PathBuf> {
    let dir = keys_dir(data_dir);
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create keys directory: {:?}", dir))?;

    let key_file = dir.join(format!("{}.json", name));
    if key_file.exists() {
        bail!("Keypair file already exists: {}", key_file.display());
    }

    let contents = KeyFile {
        address: keypair.address().to_hex(),
        private_key: hex::encode(keypair.private_key()),
    };
    fs::write(&key_file, serde_json::to_string_pretty(&contents)?)
        .with_context(|| format!("Failed to write keypair file: {:?}", key_file))?;

    Ok(key_file)
}

pub fn load_keypair(data_dir: &Path, name: &str) -> Result<Keypair> {
    let key_file = keys_dir(data_dir).join(format!("{}.json", name));
    if !key_file.exists() {
        bail!(
            "Keypair file not found: {}. Use 'powchain account new' to create one.",
            key_file.display()
        );
    }

    let contents = fs::read_to_string(&key_file)?;
    let parsed: KeyFile = serde_json::from_str(&contents)
        .with_context(|| format!("Malformed keypair file: {}", key_file.display()))?;

    let keypair =
        Keypair::from_private_key_hex(&parsed.private_key).context("Invalid private key")?;
    if keypair.address().to_hex() != parsed.address {
        bail!(
            "Keypair file {} has an address that does not match its private key",
            key_file.display()
        );
    }

    Ok(keypair)
}

/// Every `(name, address)` pair in the keys directory, sorted by name.
pub fn list_keypairs(data_dir: &Path) -> Result<Vec<(String, String)>> {
    let dir = keys_dir(data_dir);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut keys = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let contents = fs::read_to_string(&path)?;
        if let Ok(parsed) = serde_json::from_str::<KeyFile>(&contents) {
            keys.push((name.to_string(), parsed.address));
        }
    }

    keys.sort();
    Ok(keys)
}

/// Accept either a saved key name or a hex address.
pub fn resolve_address(data_dir: &Path, name_or_hex: &str) -> Result<Address> {
    let key_file = keys_dir(data_dir).join(format!("{}.json", name_or_hex));
    if key_file.exists() {
        return Ok(load_keypair(data_dir, name_or_hex)?.address());
    }

    Address::from_hex(name_or_hex)
        .with_context(|| format!("Not a key name or hex address: {}", name_or_hex))
}

pub fn load_config(data_dir: &Path) -> Result<ChainConfig> {
    let path = config_path(data_dir);
    ChainConfig::load(&path).with_context(|| {
        format!(
            "Failed to load {}. Did you run 'powchain init'?",
            path.display()
        )
    })
}

pub fn open_storage(data_dir: &Path) -> Result<Storage> {
    let path = db_path(data_dir);
    debug!(path = %path.display(), "opening storage");
    Storage::open(&path)
        .with_context(|| "Failed to open storage. Did you run 'powchain init'?")
}
