//! Outbound SMS/email worker. Queued rows are claimed in batches, handed to
//! their transport and marked `sent` or `failed`.

use sqlx::PgPool;
use tokio::sync::watch;

use crate::notify::email::Mailer;
use crate::notify::sms;
use crate::repo::comms::{self, Channel, StatusUpdate};
use crate::store::AppState;

/// Rows handled in one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub sent: usize,
    pub failed: usize,
    /// Rows given up on after their claim lease expired too often.
    pub abandoned: u64,
}

pub async fn run(state: AppState, mailer: Mailer, mut shutdown: watch::Receiver<()>) {
    let interval = state.config.outbox_poll;
    tracing::info!(interval_secs = interval.as_secs(), "outbox worker started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("outbox worker shutting down");
                break;
            }
            () = tokio::time::sleep(interval) => {
                match process_once(&state.pool, &mailer).await {
                    Ok(report) if report != TickReport::default() => {
                        tracing::info!(
                            sent = report.sent,
                            failed = report.failed,
                            abandoned = report.abandoned,
                            "outbox tick"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "outbox tick failed"),
                }
                state.rate_limiter.prune(std::time::Duration::from_secs(3600));
            }
        }
    }
}

/// Claim and deliver one batch per channel. A row whose status cannot be
/// recorded is logged and left for lease expiry; the rest of the batch
/// still runs.
pub async fn process_once(pool: &PgPool, mailer: &Mailer) -> anyhow::Result<TickReport> {
    let mut report = TickReport::default();

    for channel in [Channel::Sms, Channel::Email] {
        report.abandoned += comms::fail_abandoned(pool, channel).await?;
    }

    for row in comms::claim_sms(pool).await? {
        let outcome = sms::send(row.id, &row.to_number, &row.body).await;
        finish(pool, Channel::Sms, row.id, outcome, &mut report).await;
    }

    for row in comms::claim_email(pool).await? {
        let outcome = mailer
            .send(&row.to_address, &row.subject, &row.body)
            .await
            .map(|()| None::<String>);
        finish(pool, Channel::Email, row.id, outcome, &mut report).await;
    }

    Ok(report)
}

async fn finish<P: Into<Option<String>>>(
    pool: &PgPool,
    channel: Channel,
    id: uuid::Uuid,
    outcome: anyhow::Result<P>,
    report: &mut TickReport,
) {
    let update = match outcome {
        Ok(provider_id) => {
            report.sent += 1;
            StatusUpdate {
                status: "sent".into(),
                provider_id: provider_id.into(),
                error: None,
            }
        }
        Err(e) => {
            report.failed += 1;
            tracing::warn!(channel = channel.as_str(), %id, error = %e, "outbound delivery failed");
            StatusUpdate {
                status: "failed".into(),
                provider_id: None,
                error: Some(e.to_string()),
            }
        }
    };
    if let Err(e) = comms::set_status(pool, channel, id, &update).await {
        tracing::error!(channel = channel.as_str(), %id, error = %e, "recording delivery status failed");
    }
}
