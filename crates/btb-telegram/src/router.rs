use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};

use btb_core::{
    config::Config, correlation::CorrelationStore, dispatcher::Dispatcher as CommandDispatcher,
    messaging::MessagingPort, notes::NoteClient, vault::CredentialVault,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<CommandDispatcher>,
    pub chat_locks: Arc<ChatLocks>,
    pub bot_user_id: u64,
}

/// Per-chat sequentialization: two edits of the same note must not
/// interleave their remote calls and correlation writes.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub async fn run_polling(
    cfg: Arc<Config>,
    vault: CredentialVault,
    store: CorrelationStore,
    notes: Arc<dyn NoteClient>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    let me = bot.get_me().await?;
    tracing::info!(username = %me.username(), "bot started");
    tracing::info!(base_url = %cfg.blinko_base_url, "relaying notes");

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let dispatcher = Arc::new(CommandDispatcher::new(vault, store, notes, messenger));

    let state = Arc::new(AppState {
        dispatcher,
        chat_locks: Arc::new(ChatLocks::default()),
        bot_user_id: me.user.id.0,
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
