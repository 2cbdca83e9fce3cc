use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shelley_wallet::{
    build_address, derive_keys, generate_mnemonic, validate_mnemonic, Branch, CreateWalletError,
    CreateWalletRequest, ProgressEvent, SledWalletStore, WalletCreator, WalletStore,
};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

mod config;
mod usage_client;

use config::Config;
use usage_client::UsageClient;

#[derive(Parser)]
#[command(name = "shelley-wallet", version, about = "Shelley HD wallet creation and address discovery")]
struct Cli {
    /// Data directory (defaults to ~/.shelley-wallet)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a wallet set, generating a phrase if none is given
    InitSet {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        /// Word count of a generated phrase
        #[arg(long, default_value_t = 24)]
        words: usize,
        #[arg(long)]
        mnemonic_file: Option<PathBuf>,
    },
    /// Print the next free account index of a wallet set
    NextIndex {
        #[arg(long)]
        set: String,
    },
    /// Create a wallet and discover its addresses
    Create {
        #[arg(long)]
        set: String,
        #[arg(long)]
        name: String,
        /// Account index (defaults to the next free one)
        #[arg(long)]
        account: Option<u32>,
        #[arg(long)]
        mnemonic_file: Option<PathBuf>,
    },
    /// Derive a single address offline
    Derive {
        #[arg(long)]
        mnemonic_file: Option<PathBuf>,
        #[arg(long, default_value_t = 0)]
        account: u32,
        #[arg(long, default_value = "receiving")]
        branch: Branch,
        #[arg(long, default_value_t = 0)]
        index: u32,
    },
    /// List stored addresses of a wallet
    Addresses {
        #[arg(long)]
        wallet: String,
    },
}

/// Read the phrase from a file, or from stdin.
fn read_mnemonic(path: Option<&PathBuf>) -> Result<Zeroizing<String>> {
    let phrase = match path {
        Some(path) => Zeroizing::new(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read mnemonic file {}", path.display()))?,
        ),
        None => {
            eprint!("Enter mnemonic phrase: ");
            std::io::stderr().flush()?;
            let mut line = Zeroizing::new(String::new());
            std::io::stdin().lock().read_line(&mut line)?;
            line
        }
    };
    Ok(Zeroizing::new(phrase.trim().to_string()))
}

fn open_store(config: &Config) -> Result<Arc<SledWalletStore>> {
    let dir = config.store_dir()?;
    let store = SledWalletStore::open(&dir)
        .with_context(|| format!("Failed to open wallet store at {}", dir.display()))?;
    Ok(Arc::new(store))
}

fn print_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::Checking { .. } => {}
        ProgressEvent::Checked { branch, index, is_used } => {
            println!("  {} #{:<4} {}", branch, index, if *is_used { "used" } else { "unused" });
        }
        ProgressEvent::UsageCheckFailed { branch, index, error } => {
            println!("  {} #{:<4} unknown ({}), counted as unused", branch, index, error);
        }
        ProgressEvent::BranchScanned { branch, total, used } => {
            println!("{}: {} addresses scanned, {} used", branch, total, used);
        }
        ProgressEvent::Persisting { branch, count } => {
            println!("Saving {} {} addresses...", count, branch);
        }
        ProgressEvent::Persisted { branch, count } => {
            println!("Saved {} {} addresses", count, branch);
        }
    }
}

fn init_set(
    config: &Config,
    id: &str,
    name: &str,
    words: usize,
    mnemonic_file: Option<&PathBuf>,
) -> Result<()> {
    let store = open_store(config)?;

    let phrase = match mnemonic_file {
        Some(path) => {
            let phrase = read_mnemonic(Some(path))?;
            validate_mnemonic(&phrase)?;
            phrase
        }
        None => {
            let generated = generate_mnemonic(words)?;
            println!("Write down this recovery phrase. It will not be shown again:\n");
            println!("{}\n", generated.phrase());
            Zeroizing::new(generated.phrase().to_string())
        }
    };

    let set = store.register_wallet_set(id, name, Some(phrase.as_str()))?;
    println!("Registered wallet set {} ({})", set.id, set.name);
    Ok(())
}

async fn create(
    config: &Config,
    set: &str,
    name: &str,
    account: Option<u32>,
    mnemonic_file: Option<&PathBuf>,
) -> Result<()> {
    let store = open_store(config)?;
    let network = config.network_type()?;

    let account_index = match account {
        Some(index) => index,
        None => store.next_account_index(set).await?,
    };
    let phrase = read_mnemonic(mnemonic_file)?;
    if !store.verify_seed_phrase(set, &phrase).await? {
        bail!("The recovery phrase does not belong to wallet set {}", set);
    }

    let oracle = UsageClient::new(
        &config.usage_oracle.endpoint,
        config.usage_oracle.project_id.clone(),
        Duration::from_secs(config.usage_oracle.timeout_secs),
    )?;

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, stopping discovery");
            ctrl_c_token.cancel();
        }
    });

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_progress(&event);
        }
    });

    let creator = WalletCreator::new(store.clone(), Arc::new(oracle), network)
        .with_gap_limit(config.gap_limit)
        .with_cancellation(cancel)
        .with_progress(tx);
    let request = CreateWalletRequest {
        wallet_set_id: set.to_string(),
        wallet_name: name.to_string(),
        account_index,
        mnemonic: phrase,
    };
    let result = creator.create_wallet(&request).await;
    drop(creator);
    let _ = printer.await;

    match result {
        Ok(created) => {
            println!("\nWallet {} created (account {})", created.wallet_id, created.account_index);
            println!("  address:       {}", created.address);
            println!("  stake address: {}", created.stake_address);
            println!(
                "  receiving:     {} addresses, {} used",
                created.receiving.persisted.len(),
                created.receiving.used
            );
            println!(
                "  change:        {} addresses, {} used",
                created.change.persisted.len(),
                created.change.used
            );
            Ok(())
        }
        Err(e) => {
            if let Some(partial) = e.partial() {
                eprintln!("Partially created: {}", partial);
            }
            if matches!(e, CreateWalletError::KeyAddressMismatch { .. }) {
                log::error!("Key/address self-check failed; nothing further was stored");
            }
            Err(e.into())
        }
    }
}

fn derive(
    config: &Config,
    mnemonic_file: Option<&PathBuf>,
    account: u32,
    branch: Branch,
    index: u32,
) -> Result<()> {
    let phrase = read_mnemonic(mnemonic_file)?;
    let keys = derive_keys(&phrase, account)?;
    let derived = build_address(&keys, branch, index, config.network_type()?)?;

    println!("path:             {}", derived.path);
    println!("address:          {}", derived.address);
    println!("payment key hash: {}", derived.payment_key_hash);
    println!("public key:       {}", derived.public_key_bech32()?);
    Ok(())
}

fn list_addresses(config: &Config, wallet: &str) -> Result<()> {
    let store = open_store(config)?;
    if store.get_wallet(wallet)?.is_none() {
        bail!("Unknown wallet {}", wallet);
    }

    for (id, record) in store.list_addresses(wallet)? {
        let usage = match (&record.usage_error, record.is_used) {
            (Some(_), _) => "unknown",
            (None, true) => "used",
            (None, false) => "unused",
        };
        println!("{:<28} {:<8} {}", id, usage, record.address);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::load(cli.data_dir.as_deref())?;

    match cli.command {
        Command::InitSet {
            id,
            name,
            words,
            mnemonic_file,
        } => init_set(&config, &id, &name, words, mnemonic_file.as_ref()),
        Command::NextIndex { set } => {
            let store = open_store(&config)?;
            println!("{}", store.next_account_index(&set).await?);
            Ok(())
        }
        Command::Create {
            set,
            name,
            account,
            mnemonic_file,
        } => create(&config, &set, &name, account, mnemonic_file.as_ref()).await,
        Command::Derive {
            mnemonic_file,
            account,
            branch,
            index,
        } => derive(&config, mnemonic_file.as_ref(), account, branch, index),
        Command::Addresses { wallet } => list_addresses(&config, &wallet),
    }
}
