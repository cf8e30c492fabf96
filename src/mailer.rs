use axum::async_trait;
use tracing::info;

/// Outbound mail is an external collaborator: the ledger persists first,
/// then hands the code off here with no lock held. A failed send is
/// reported to the caller as a delivery error so they re-issue.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_otp(&self, email: &str, code: &str) -> anyhow::Result<()>;
    async fn send_reset_link(&self, email: &str, link: &str) -> anyhow::Result<()>;
}

/// Local dev sender that logs instead of sending real mail.
#[derive(Clone, Debug)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_otp(&self, email: &str, code: &str) -> anyhow::Result<()> {
        info!(to = %email, %code, "dev mailer: verification code");
        Ok(())
    }

    async fn send_reset_link(&self, email: &str, link: &str) -> anyhow::Result<()> {
        info!(to = %email, %link, "dev mailer: password reset link");
        Ok(())
    }
}
