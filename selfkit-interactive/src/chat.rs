//! Outbound chat helpers.

use selfkit_lib::message::{Chat, ContentPayload};
use selfkit_lib::{Account, Address, ContentId};
use tracing::{info, warn};

use crate::Result;

/// Greeting sent after a discovery round in the chat demo.
pub const GREETING: &str = "Hello!";

/// Send a chat message followed by a push notification summarising it.
///
/// A failed notification is logged; the message itself was already delivered.
pub async fn send_with_notification(
    account: &dyn Account,
    to: &Address,
    text: &str,
) -> Result<ContentId> {
    let content = Chat::new(text).into_content()?;
    account.message_send(to, &content).await?;
    info!(%to, request_id = %content.id(), "sent chat message");

    if let Err(error) = account.notification_send(to, &content.summary()).await {
        warn!(%to, %error, "failed to send notification");
    }

    Ok(content.id().clone())
}
