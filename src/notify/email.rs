use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::Config;

enum Delivery {
    Smtp {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    },
    Log,
}

/// Outbound email transport. Uses SMTP (STARTTLS) when `SMTP_HOST` is set,
/// otherwise only logs the message.
pub struct Mailer {
    delivery: Delivery,
}

impl Mailer {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let Some(ref smtp_host) = config.smtp_host else {
            tracing::warn!("SMTP not configured, outbound email will only be logged");
            return Ok(Self {
                delivery: Delivery::Log,
            });
        };

        let from: Mailbox = config
            .smtp_from
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid SMTP_FROM address '{}': {e}", config.smtp_from))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)
            .map_err(|e| anyhow::anyhow!("SMTP relay setup failed: {e}"))?
            .port(config.smtp_port);

        if let Some(ref username) = config.smtp_username {
            let password = config.smtp_password.as_deref().unwrap_or("");
            builder = builder.credentials(Credentials::new(username.clone(), password.to_owned()));
        }

        Ok(Self {
            delivery: Delivery::Smtp {
                transport: builder.build(),
                from,
            },
        })
    }

    /// Mailer that never touches the network.
    pub fn log_only() -> Self {
        Self {
            delivery: Delivery::Log,
        }
    }

    /// Send a plain-text email, retrying once on failure.
    #[tracing::instrument(skip(self, body), fields(%to), err)]
    pub async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        check_header("to", to)?;
        check_header("subject", subject)?;

        let (transport, from) = match &self.delivery {
            Delivery::Log => {
                tracing::info!(to, subject, "email logged (no SMTP transport)");
                return Ok(());
            }
            Delivery::Smtp { transport, from } => (transport, from),
        };

        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid recipient address '{to}': {e}"))?;

        let message = Message::builder()
            .from(from.clone())
            .to(to_mailbox)
            .subject(subject)
            .body(body.to_owned())
            .map_err(|e| anyhow::anyhow!("failed to build email: {e}"))?;

        if let Err(first_err) = transport.send(message.clone()).await {
            tracing::warn!(error = %first_err, "email send failed, retrying once");
            transport
                .send(message)
                .await
                .map_err(|e| anyhow::anyhow!("email send failed after retry: {e}"))?;
        }
        tracing::info!(to, subject, "email sent");
        Ok(())
    }
}

/// Header values must stay on one line.
fn check_header(name: &str, value: &str) -> anyhow::Result<()> {
    if value.contains(['\n', '\r']) {
        anyhow::bail!("email '{name}' contains invalid characters");
    }
    Ok(())
}
