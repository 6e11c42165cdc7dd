use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use btb_core::{
    dispatcher::IncomingMessage,
    domain::{ChatId, MessageId, UserId},
};

use crate::router::AppState;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text().map(|s| s.to_string()) else {
        return Ok(());
    };
    if text.trim().is_empty() {
        return Ok(());
    }

    // Only replies to the bot's own messages count as edit requests.
    let reply_to = msg
        .reply_to_message()
        .filter(|r| r.from().map(|u| u.id.0) == Some(state.bot_user_id))
        .map(|r| MessageId(r.id.0));

    let incoming = IncomingMessage {
        chat_id: ChatId(msg.chat.id.0),
        user_id: UserId(user.id.0 as i64),
        text,
        reply_to,
    };

    let _guard = state.chat_locks.lock_chat(incoming.chat_id.0).await;
    if let Err(e) = state.dispatcher.dispatch(&incoming).await {
        tracing::error!(chat_id = incoming.chat_id.0, error = %e, "dispatch failed");
    }

    Ok(())
}
