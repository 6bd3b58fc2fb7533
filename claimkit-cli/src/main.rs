//! `claimkit` developer CLI.
//!
//! - `claimkit encode` - render a credential as an animated-QR frame sequence
//! - `claimkit decode` - play a frame sequence through the scanner into the wallet
//! - `claimkit claim` - queue a static claim link
//! - `claimkit redeem` - drain the claim queue
//! - `claimkit sync` - mirror the local queue to the remote claim-queue service
//! - `claimkit list` - show stored credentials and pending tickets

#![forbid(unsafe_code)]

mod claims;
mod transfer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use claimkit_core::claim::ClaimQueue;
use claimkit_core::config::RemoteConfig;
use claimkit_core::storage::{AtomicBlobStore, CredentialStore, FsBlobStore};
use claimkit_core::Request;
use eyre::WrapErr;

/// ClaimKit developer CLI.
#[derive(Parser)]
#[command(name = "claimkit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Wallet data directory.
    #[arg(long, env = "CLAIMKIT_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Base URL of the remote claim-queue API.
    #[arg(long, env = "CLAIMKIT_API_BASE", global = true)]
    api_base: Option<String>,

    /// Bearer token for the remote claim-queue API.
    #[arg(long, env = "CLAIMKIT_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a signed credential as a fragment sequence, one frame per line.
    Encode(transfer::EncodeArgs),

    /// Feed a fragment sequence (one frame per line) through the scanner.
    ///
    /// Frames are replayed at the display's cycle rate, so throttling and
    /// de-duplication behave as they would with a camera.
    Decode(transfer::DecodeArgs),

    /// Queue a claim link and try to redeem it right away.
    Claim(claims::ClaimArgs),

    /// Redeem every queued claim ticket.
    Redeem,

    /// Push the local claim queue to the remote service and show what it holds.
    Sync,

    /// List stored credentials and pending claim tickets.
    List,
}

/// Wallet state shared by the subcommands.
struct Wallet {
    store: Arc<CredentialStore>,
    queue: ClaimQueue,
    remote: RemoteConfig,
}

impl Wallet {
    fn open(data_dir: Option<&Path>, remote: RemoteConfig) -> eyre::Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir.to_path_buf(),
            None => dirs::data_dir()
                .ok_or_else(|| eyre::eyre!("no platform data directory, pass --data-dir"))?
                .join("claimkit"),
        };
        tracing::debug!(path = %data_dir.display(), "opening wallet");

        let blobs: Arc<dyn AtomicBlobStore> = Arc::new(
            FsBlobStore::open(&data_dir)
                .wrap_err_with(|| format!("opening {}", data_dir.display()))?,
        );

        Ok(Self {
            store: Arc::new(CredentialStore::new(Arc::clone(&blobs))),
            queue: ClaimQueue::new(blobs, Request::default()),
            remote,
        })
    }

    /// The remote configuration, if complete.
    fn remote(&self) -> Option<&RemoteConfig> {
        self.remote.resolve().is_ok().then_some(&self.remote)
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Logs go to stderr so stdout stays clean for frames and JSON.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let Cli {
        data_dir,
        api_base,
        token,
        command,
    } = Cli::parse();
    let open = || {
        Wallet::open(
            data_dir.as_deref(),
            RemoteConfig {
                api_base: api_base.clone(),
                auth_token: token.clone(),
            },
        )
    };

    match command {
        Commands::Encode(args) => transfer::encode(&args),
        Commands::Decode(args) => transfer::decode(&open()?, &args).await,
        Commands::Claim(args) => claims::claim(&open()?, &args).await,
        Commands::Redeem => claims::redeem(&open()?).await,
        Commands::Sync => claims::sync(&open()?).await,
        Commands::List => claims::list(&open()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A wallet rooted in a fresh temporary directory, without a remote.
    pub(crate) fn temp_wallet() -> (tempfile::TempDir, Wallet) {
        let dir = tempfile::tempdir().unwrap();
        let wallet = Wallet::open(Some(dir.path()), RemoteConfig::default()).unwrap();
        (dir, wallet)
    }

    #[test]
    fn test_open_uses_given_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested").join("wallet");
        Wallet::open(Some(&data_dir), RemoteConfig::default()).unwrap();
        assert!(data_dir.is_dir());
    }

    #[test]
    fn test_remote_requires_base_and_token() {
        let (dir, _) = temp_wallet();
        let half = RemoteConfig {
            api_base: Some("https://api.example.org".to_string()),
            auth_token: None,
        };
        let wallet = Wallet::open(Some(dir.path()), half).unwrap();
        assert!(wallet.remote().is_none());

        let full = RemoteConfig::new("https://api.example.org", "secret");
        let wallet = Wallet::open(Some(dir.path()), full.clone()).unwrap();
        assert_eq!(wallet.remote(), Some(&full));
    }

    #[test]
    fn test_global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "claimkit",
            "list",
            "--data-dir",
            "/tmp/wallet",
            "--api-base",
            "https://api.example.org",
        ])
        .unwrap();
        assert_eq!(cli.data_dir.as_deref(), Some(Path::new("/tmp/wallet")));
        assert_eq!(cli.api_base.as_deref(), Some("https://api.example.org"));
        assert!(matches!(cli.command, Commands::List));
    }
}
