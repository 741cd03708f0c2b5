//! Email templates and the outbox worker.
//!
//! Account flows enqueue rows in `email_outbox` with status `pending`
//! (inside the same transaction as the change they announce). A background
//! task periodically polls that table, locks a batch via
//! `FOR UPDATE SKIP LOCKED`, renders the template with the queued payload,
//! and hands the result to an [`EmailSender`]. The worker then updates the
//! row to `sent`, or retries failures with exponential backoff and jitter
//! until a max attempt threshold, then marks them `failed`.
//!
//! The default sender for local dev is [`LogEmailSender`], which logs the
//! rendered message and returns `Ok(())`. Real delivery (SMTP, provider API)
//! is a separate implementation of the trait.

use anyhow::{anyhow, Context, Result};
use rand::Rng;
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

pub const TEMPLATE_VERIFY_EMAIL: &str = "verify_email";
pub const TEMPLATE_PASSWORD_RESET: &str = "password_reset";
pub const TEMPLATE_PASSWORD_CHANGED: &str = "password_changed";
pub const TEMPLATE_ACCOUNT_DELETED: &str = "account_deleted";

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

/// A template instantiated with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Fill a known template with `{{key}}` values from the payload.
///
/// # Errors
/// Returns an error for an unknown template name, which sends the outbox row
/// down the retry/failed path.
pub fn render(template: &str, payload: &Value) -> Result<RenderedEmail> {
    let (subject, html, text) = match template {
        TEMPLATE_VERIFY_EMAIL => (
            "Verify your account",
            r#"<p>Hi {{name}},</p>
<p>Confirm your address by clicking <a href="{{verify_url}}">this link</a>.</p>"#,
            "Verify your account by opening this link: {{verify_url}}",
        ),
        TEMPLATE_PASSWORD_RESET => (
            "Reset your password",
            r#"<p>Hi {{name}},</p>
<p>Reset your password via <a href="{{reset_url}}">this link</a>. The link expires in 1 hour.</p>"#,
            "Reset your password by opening this link: {{reset_url}}. It expires in 1 hour.",
        ),
        TEMPLATE_PASSWORD_CHANGED => (
            "Your password has been changed",
            r"<p>Hi {{name}},</p>
<p>Your password was changed. If this wasn't you, contact support immediately.</p>",
            "Your password was changed. If this wasn't you, contact support immediately.",
        ),
        TEMPLATE_ACCOUNT_DELETED => (
            "Your account has been deleted",
            r"<p>Hi {{name}},</p>
<p>Your account and its data have been deleted. We're sorry to see you go.</p>",
            "Your account and its data have been deleted. We're sorry to see you go.",
        ),
        other => return Err(anyhow!("unknown email template: {other}")),
    };

    Ok(RenderedEmail {
        subject: interpolate(subject, payload),
        html: interpolate(html, payload),
        text: interpolate(text, payload),
    })
}

fn interpolate(body: &str, payload: &Value) -> String {
    let Some(object) = payload.as_object() else {
        return body.to_string();
    };
    let mut out = body.to_string();
    for (key, value) in object {
        let placeholder = format!("{{{{{key}}}}}");
        let replacement = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        out = out.replace(&placeholder, &replacement);
    }
    out
}

/// Email delivery abstraction used by the outbox worker.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to mark it as failed.
    ///
    /// # Errors
    /// Implementations return an error when the message cannot be delivered.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that renders and logs instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        let payload: Value = serde_json::from_str(&message.payload_json)
            .context("failed to parse outbox payload json")?;
        let rendered = render(&message.template, &payload)?;
        info!(
            to_email = %message.to_email,
            template = %message.template,
            subject = %rendered.subject,
            text = %rendered.text,
            "email outbox send stub"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EmailWorkerConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl EmailWorkerConfig {
    /// Default worker config: 5s poll interval, 10 messages per batch,
    /// 5 max attempts, and 5s->5m exponential backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Clamp nonsensical values so a bad flag cannot wedge the worker.
    #[must_use]
    pub fn normalize(self) -> Self {
        let poll_interval = if self.poll_interval.is_zero() {
            Duration::from_secs(1)
        } else {
            self.poll_interval
        };
        let batch_size = if self.batch_size == 0 {
            1
        } else {
            self.batch_size
        };
        let max_attempts = self.max_attempts.max(1);
        let backoff_base = if self.backoff_base.is_zero() {
            Duration::from_secs(1)
        } else {
            self.backoff_base
        };
        let backoff_max = if self.backoff_max < backoff_base {
            backoff_base
        } else {
            self.backoff_max
        };
        Self {
            poll_interval,
            batch_size,
            max_attempts,
            backoff_base,
            backoff_max,
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        self.backoff_max
    }
}

impl Default for EmailWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue an email inside the caller's transaction so the message and the
/// change it announces commit or roll back together.
///
/// # Errors
/// Returns an error if serialization or the insert fails.
pub async fn enqueue(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    to_email: &str,
    template: &str,
    payload: &Value,
) -> Result<()> {
    let payload_text = serde_json::to_string(payload).context("failed to serialize email payload")?;

    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(to_email)
        .bind(template)
        .bind(payload_text)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to enqueue email")?;
    Ok(())
}

/// Spawn a background task that polls and processes the email outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: Arc<dyn EmailSender>,
    config: EmailWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = config.normalize();
        let poll_interval = config.poll_interval();

        loop {
            let batch_result = process_outbox_batch(&pool, sender.as_ref(), &config).await;
            if let Err(err) = batch_result {
                error!("email outbox batch failed: {err}");
            }

            sleep(poll_interval).await;
        }
    })
}

async fn process_outbox_batch(
    pool: &PgPool,
    sender: &dyn EmailSender,
    config: &EmailWorkerConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start email outbox transaction")?;

    // Grab a locked batch so multiple workers can run without double-sending.
    let query = r"
        SELECT id, to_email, template, payload_json::text AS payload_json, attempts
        FROM email_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size()).unwrap_or(0))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load email outbox batch")?;

    if rows.is_empty() {
        // Commit even on empty to release locks and keep poll loop consistent.
        tx.commit()
            .await
            .context("failed to commit empty outbox batch")?;
        return Ok(0);
    }

    let row_count = rows.len();
    for row in rows {
        let id: Uuid = row.get("id");
        let attempts: i32 = row.get("attempts");
        let attempts = u32::try_from(attempts).unwrap_or(0);
        let message = EmailMessage {
            to_email: row.get("to_email"),
            template: row.get("template"),
            payload_json: row.get("payload_json"),
        };

        let send_result = sender.send(&message);
        update_outbox_status(&mut tx, id, attempts, send_result, config).await?;
    }

    tx.commit()
        .await
        .context("failed to commit email outbox batch")?;

    Ok(row_count)
}

async fn update_outbox_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    attempts: u32,
    send_result: Result<()>,
    config: &EmailWorkerConfig,
) -> Result<()> {
    let next_attempt = attempts.saturating_add(1);
    let next_attempts_i32 = i32::try_from(next_attempt).unwrap_or(i32::MAX);
    match send_result {
        Ok(()) => {
            sqlx::query(
                r"
                UPDATE email_outbox
                SET status = 'sent',
                    attempts = $2,
                    last_error = NULL,
                    sent_at = NOW(),
                    next_attempt_at = NOW()
                WHERE id = $1
                ",
            )
            .bind(id)
            .bind(next_attempts_i32)
            .execute(&mut **tx)
            .await
            .context("failed to update outbox status to sent")?;
        }
        Err(err) => {
            if next_attempt >= config.max_attempts() {
                sqlx::query(
                    r"
                    UPDATE email_outbox
                    SET status = 'failed',
                        attempts = $2,
                        last_error = $3,
                        next_attempt_at = NOW()
                    WHERE id = $1
                    ",
                )
                .bind(id)
                .bind(next_attempts_i32)
                .bind(err.to_string())
                .execute(&mut **tx)
                .await
                .context("failed to update outbox status to failed")?;
            } else {
                let delay =
                    backoff_delay(next_attempt, config.backoff_base(), config.backoff_max());
                let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
                sqlx::query(
                    r"
                    UPDATE email_outbox
                    SET status = 'pending',
                        attempts = $2,
                        last_error = $3,
                        next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
                    WHERE id = $1
                    ",
                )
                .bind(id)
                .bind(next_attempts_i32)
                .bind(err.to_string())
                .bind(delay_ms)
                .execute(&mut **tx)
                .await
                .context("failed to update outbox retry schedule")?;
            }
        }
    }

    Ok(())
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max);
    let capped = if delay > max { max } else { delay };
    jitter_delay(capped)
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn render_interpolates_payload_values() {
        let rendered = render(
            TEMPLATE_VERIFY_EMAIL,
            &json!({ "name": "ada", "verify_url": "https://kerno.dev/verify#t" }),
        )
        .expect("render");

        assert_eq!(rendered.subject, "Verify your account");
        assert!(rendered.html.contains("Hi ada,"));
        assert!(rendered.html.contains(r#"href="https://kerno.dev/verify#t""#));
        assert!(rendered
            .text
            .contains("https://kerno.dev/verify#t"));
    }

    #[test]
    fn render_leaves_unknown_placeholders_alone() {
        let rendered = render(TEMPLATE_PASSWORD_RESET, &json!({ "name": "ada" })).expect("render");
        // Missing payload keys stay visible rather than rendering empty.
        assert!(rendered.text.contains("{{reset_url}}"));
    }

    #[test]
    fn render_rejects_unknown_template() {
        let err = render("newsletter", &json!({})).expect_err("must fail");
        assert!(err.to_string().contains("unknown email template"));
    }

    #[test]
    fn log_sender_accepts_known_templates() {
        let sender = LogEmailSender;
        let message = EmailMessage {
            to_email: "ada@example.com".to_string(),
            template: TEMPLATE_ACCOUNT_DELETED.to_string(),
            payload_json: r#"{"name":"ada"}"#.to_string(),
        };
        assert!(sender.send(&message).is_ok());

        let bogus = EmailMessage {
            template: "newsletter".to_string(),
            ..message
        };
        assert!(sender.send(&bogus).is_err());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);

        // Jitter keeps the delay within [half, full] of the capped value.
        let first = backoff_delay(1, base, max);
        assert!(first >= Duration::from_millis(2_500) && first <= base);

        let late = backoff_delay(30, base, max);
        assert!(late >= Duration::from_secs(150) && late <= max);
    }

    #[test]
    fn config_normalize_fixes_zeroes() {
        let config = EmailWorkerConfig::new()
            .with_poll_interval_seconds(0)
            .with_batch_size(0)
            .with_max_attempts(0)
            .normalize();

        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.batch_size(), 1);
        assert_eq!(config.max_attempts(), 1);
        assert!(config.backoff_max() >= config.backoff_base());
    }
}
