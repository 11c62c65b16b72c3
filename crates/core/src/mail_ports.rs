//! Mail message storage port

use async_trait::async_trait;
use tidemark_domain::{MailMessage, Result};

/// Mail message persistence, keyed by `(user_id, message_id)`
#[async_trait]
pub trait MailMessageRepository: Send + Sync {
    /// Idempotent insert-or-update
    async fn upsert_messages(&self, messages: &[MailMessage]) -> Result<usize>;

    async fn find_message(&self, user_id: &str, message_id: &str) -> Result<Option<MailMessage>>;
}
