use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    Result,
};

/// Chat-transport port.
///
/// Telegram is the only implementation today; the dispatcher stays testable
/// against a fake.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    /// Send an HTML-formatted message and return a reference to it. The
    /// returned message id anchors edit-via-reply correlations.
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;

    /// Best-effort "typing" indicator while a remote call is in flight.
    async fn send_typing(&self, chat_id: ChatId) -> Result<()>;
}
