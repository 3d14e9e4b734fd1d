#![expect(clippy::print_stdout, reason = "command output")]

use {
    anyhow::{Context, Result, bail},
    clap::{Parser, Subcommand},
    sealpost_protocol::{ClientIdentity, credentials::TransferKey},
    sealpost_server::{Config, keys::KeyStore, storage::Storage},
    std::path::PathBuf,
};

/// Manages sender keys and received files of a sealpost server.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    #[arg(long)]
    pub config: PathBuf,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Generates a key for a sender identity (`ip:port`).
    AddClient {
        identity: String,
        /// Where to write the key for the sender.
        #[arg(long)]
        key_out: PathBuf,
    },
    /// Lists identities that hold a key.
    Clients,
    /// Deletes the key of an identity.
    Revoke { identity: String },
    /// Lists files received from an identity.
    Files { identity: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::parse(&cli.config)?;
    let keys = KeyStore::new(config.keys_dir())?;
    match cli.command {
        Command::AddClient { identity, key_out } => {
            let identity = ClientIdentity::from_stored(identity);
            if keys.load_key(&identity)?.is_some() {
                bail!("{identity} already has a key; revoke it first");
            }
            let key = TransferKey::generate();
            key.write_to(&key_out)
                .with_context(|| format!("failed to write key to {}", key_out.display()))?;
            keys.store_key(&identity, &key)?;
            println!(
                "Added {identity}. Key written to {}; pass it to the sender with `--key`.",
                key_out.display()
            );
        }
        Command::Clients => {
            let identities = keys.identities()?;
            if identities.is_empty() {
                println!("No configured clients.");
            }
            for identity in identities {
                println!("{identity}");
            }
        }
        Command::Revoke { identity } => {
            let identity = ClientIdentity::from_stored(identity);
            if !keys.revoke_key(&identity)? {
                bail!("{identity} has no key");
            }
            println!("Revoked the key of {identity}.");
        }
        Command::Files { identity } => {
            let storage = Storage::new(config.received_dir())?;
            let namespace = storage.namespace(&ClientIdentity::from_stored(identity))?;
            let files = namespace.files()?;
            if files.is_empty() {
                println!("No files.");
            }
            for file in files {
                let filename = file
                    .provenance
                    .map_or_else(|| "?".to_owned(), |provenance| provenance.filename);
                println!("{}  {:>10}  {filename}", file.name, file.size);
            }
        }
    }
    Ok(())
}
