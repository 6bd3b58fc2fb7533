//! `claim`, `redeem`, `sync` and `list`: the claim-link path.

use clap::Args;
use claimkit_core::claim::{ClaimOutcome, ClaimTicket, RedeemSummary};

use crate::Wallet;

#[derive(Args)]
pub struct ClaimArgs {
    /// Claim link, `https://<issuer>/c/<token>`.
    url: String,

    /// Unix seconds after which the ticket is dropped.
    #[arg(long)]
    expires_at: Option<u64>,

    /// Only queue the ticket, do not try to redeem it.
    #[arg(long)]
    no_redeem: bool,
}

pub async fn claim(wallet: &Wallet, args: &ClaimArgs) -> eyre::Result<()> {
    let mut ticket = ClaimTicket::from_claim_url(&args.url)?;
    if let Some(expires_at) = args.expires_at {
        ticket = ticket.with_expiry(expires_at);
    }

    if args.no_redeem {
        wallet.queue.enqueue(&ticket, wallet.remote()).await?;
        println!("queued {}", ticket.token);
        return Ok(());
    }

    let store = &wallet.store;
    let outcome = wallet
        .queue
        .add_ticket_and_try_redeem(&ticket, wallet.remote(), |credential| {
            store.insert(&credential)?;
            Ok(())
        })
        .await?;

    match outcome {
        ClaimOutcome::Redeemed(summary) => report(&summary),
        ClaimOutcome::Deferred(summary) => {
            report(&summary);
            println!("{} stays queued, run `claimkit redeem` later", ticket.token);
        }
    }
    Ok(())
}

pub async fn redeem(wallet: &Wallet) -> eyre::Result<()> {
    let summary = wallet
        .queue
        .redeem_into(wallet.remote(), &wallet.store)
        .await?;
    report(&summary);
    Ok(())
}

pub async fn sync(wallet: &Wallet) -> eyre::Result<()> {
    let Some(remote) = wallet.remote() else {
        eyre::bail!("sync needs --api-base and --token (or CLAIMKIT_API_BASE and CLAIMKIT_TOKEN)");
    };

    let sent = wallet.queue.mirror_all(remote).await?;
    println!("mirrored {sent} local tickets");

    for ticket in wallet.queue.remote_tickets(remote).await? {
        println!("remote\t{}\t{}", ticket.token, ticket.url);
    }
    Ok(())
}

pub fn list(wallet: &Wallet) -> eyre::Result<()> {
    for credential in wallet.store.list()? {
        println!(
            "{}\t{}\t{}",
            credential.id,
            credential.metadata.title,
            credential.metadata.subject_name.as_deref().unwrap_or("-")
        );
    }
    for ticket in wallet.queue.pending()? {
        println!("pending\t{}\t{}", ticket.token, ticket.url);
    }
    Ok(())
}

fn report(summary: &RedeemSummary) {
    tracing::info!(
        tier = %summary.tier,
        redeemed = summary.redeemed.len(),
        failed = summary.failures.len(),
        expired = summary.expired.len(),
        remaining = summary.remaining,
        "redemption finished"
    );
    for token in &summary.redeemed {
        println!("redeemed {token}");
    }
    for failure in &summary.failures {
        println!("failed {}: {}", failure.token, failure.reason);
    }
    for token in &summary.expired {
        println!("expired {token}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::temp_wallet;

    #[tokio::test]
    async fn test_sync_requires_remote_config() {
        let (_dir, wallet) = temp_wallet();
        let err = sync(&wallet).await.unwrap_err();
        assert!(err.to_string().contains("--api-base"));
    }

    #[tokio::test]
    async fn test_claim_without_redeem_only_queues() {
        let (_dir, wallet) = temp_wallet();
        let args = ClaimArgs {
            url: "https://issuer.example.org/c/abc123XY".to_string(),
            expires_at: Some(4_102_444_800),
            no_redeem: true,
        };

        claim(&wallet, &args).await.unwrap();

        let pending = wallet.queue.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].token, "abc123XY");
        assert_eq!(pending[0].expires_at, Some(4_102_444_800));
        assert_eq!(wallet.store.len().unwrap(), 0);
        list(&wallet).unwrap();
    }

    #[tokio::test]
    async fn test_claim_rejects_plain_http_link() {
        let (_dir, wallet) = temp_wallet();
        let args = ClaimArgs {
            url: "http://issuer.example.org/c/abc123XY".to_string(),
            expires_at: None,
            no_redeem: true,
        };

        assert!(claim(&wallet, &args).await.is_err());
        assert!(wallet.queue.pending().unwrap().is_empty());
    }
}
