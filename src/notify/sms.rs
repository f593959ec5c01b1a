/// SMS transport. No provider is wired in, so messages are written to the
/// log and reported as delivered with a synthetic provider id.
#[tracing::instrument(skip(body), fields(%to), err)]
pub async fn send(id: uuid::Uuid, to: &str, body: &str) -> anyhow::Result<String> {
    let digits = to.chars().filter(char::is_ascii_digit).count();
    if digits < 7 {
        anyhow::bail!("invalid destination number");
    }
    tracing::info!(chars = body.chars().count(), "sms logged (no provider configured)");
    Ok(format!("log-{id}"))
}
