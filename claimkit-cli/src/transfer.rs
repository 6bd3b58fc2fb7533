//! `encode` and `decode`: the animated-QR transfer path.

use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use claimkit_core::config::{ScanConfig, DEFAULT_FRAGMENT_SCHEME};
use claimkit_core::envelope::Envelope;
use claimkit_core::fragment::encode::{fountain_fragments, legacy_fragments};
use claimkit_core::scan::{ScanEvent, Scanner};
use eyre::WrapErr;

use crate::Wallet;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum FamilyArg {
    /// Numbered `k of n` slices.
    Legacy,
    /// `RaptorQ` packets.
    Fountain,
}

#[derive(Args)]
pub struct EncodeArgs {
    /// Compact JWS to transfer.
    #[arg(long)]
    jws: String,

    /// Issuer content digest, used as the credential id.
    #[arg(long)]
    digest: Option<String>,

    /// Fragment family.
    #[arg(long, value_enum, default_value_t = FamilyArg::Legacy)]
    family: FamilyArg,

    /// Payload type label.
    #[arg(long, default_value = "vc-envelope")]
    kind: String,

    /// Bytes per legacy part.
    #[arg(long, default_value_t = 64)]
    part_size: usize,

    /// Bytes per fountain symbol.
    #[arg(long, default_value_t = 64)]
    symbol_size: u16,

    /// Fountain repair symbols appended after the source symbols.
    #[arg(long, default_value_t = 8)]
    repair: u32,
}

#[derive(Args)]
pub struct DecodeArgs {
    /// File with one scanned frame per line, `-` for stdin.
    input: PathBuf,

    /// Milliseconds between replayed frames.
    #[arg(long, default_value_t = 200)]
    interval_ms: u64,
}

pub fn encode(args: &EncodeArgs) -> eyre::Result<()> {
    let bytes = Envelope::new(args.jws.trim(), args.digest.clone()).encode()?;
    let frames = match args.family {
        FamilyArg::Legacy => {
            legacy_fragments(DEFAULT_FRAGMENT_SCHEME, &args.kind, &bytes, args.part_size)?
        }
        FamilyArg::Fountain => fountain_fragments(
            DEFAULT_FRAGMENT_SCHEME,
            &args.kind,
            &bytes,
            args.symbol_size,
            args.repair,
        )?,
    };
    tracing::info!(frames = frames.len(), bytes = bytes.len(), "encoded transfer");

    for frame in frames {
        println!("{frame}");
    }
    Ok(())
}

pub async fn decode(wallet: &Wallet, args: &DecodeArgs) -> eyre::Result<()> {
    let reader: Box<dyn Read> = if args.input.as_os_str() == "-" {
        Box::new(std::io::stdin())
    } else {
        Box::new(
            std::fs::File::open(&args.input)
                .wrap_err_with(|| format!("reading {}", args.input.display()))?,
        )
    };

    let mut scanner = Scanner::new(ScanConfig::default(), wallet.store.clone());
    let interval = Duration::from_millis(args.interval_ms);
    let mut now = Instant::now();
    let mut stored = 0_usize;

    for line in BufReader::new(reader).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        now += interval;

        match scanner.on_scan(&line, now)? {
            ScanEvent::Status(status) => {
                tracing::debug!(progress = status.progress, stalled = status.stalled, "scanning");
            }
            ScanEvent::ClaimLink(ticket) => {
                tracing::info!(token = %ticket.token, "claim link found");
                wallet.queue.enqueue(&ticket, wallet.remote()).await?;
            }
            ScanEvent::Stored {
                credential,
                inserted,
            } => {
                stored += 1;
                tracing::info!(id = %credential.id, inserted, "credential decoded");
                println!("{}", serde_json::to_string_pretty(&credential)?);
            }
            ScanEvent::Failed(e) => tracing::warn!("scan failed: {e}"),
        }
    }

    if stored == 0 {
        let status = scanner.session().status(now);
        eyre::bail!(
            "input ended before a credential was decoded ({}%)",
            status.progress
        );
    }
    Ok(())
}
