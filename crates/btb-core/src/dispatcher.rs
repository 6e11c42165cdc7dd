//! Command dispatcher: classifies incoming chat messages and drives the
//! vault, the remote note client and the correlation store.
//!
//! Classification is command-first: any `/command` text is handled as a
//! command even when it arrives as a reply. Non-command replies to bot
//! messages are edit requests; everything else is ignored.

use std::sync::Arc;

use crate::{
    correlation::{content_hash, CorrelationStore},
    domain::{ChatId, MessageId, NoteKind, UserId},
    errors::Error,
    formatting::{escape_html, preview},
    messaging::MessagingPort,
    notes::NoteClient,
    vault::CredentialVault,
    Result,
};

const PREVIEW_CHARS: usize = 100;
const MIN_TOKEN_LEN: usize = 10;

/// A transport-normalized incoming chat message.
///
/// `reply_to` is set only when the message replies to one the bot itself
/// sent; the adapter resolves that before calling the dispatcher.
#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub text: String,
    pub reply_to: Option<MessageId>,
}

pub struct Dispatcher {
    vault: CredentialVault,
    store: CorrelationStore,
    notes: Arc<dyn NoteClient>,
    messenger: Arc<dyn MessagingPort>,
}

impl Dispatcher {
    pub fn new(
        vault: CredentialVault,
        store: CorrelationStore,
        notes: Arc<dyn NoteClient>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            vault,
            store,
            notes,
            messenger,
        }
    }

    /// Entry point for every incoming chat message.
    ///
    /// All vault/client/store failures are converted to short user-visible
    /// replies here; no token or internal state ever reaches the chat, and a
    /// failure for one user never escapes into another user's handling.
    pub async fn dispatch(&self, msg: &IncomingMessage) -> Result<()> {
        if let Err(e) = self.dispatch_inner(msg).await {
            tracing::error!(user_id = msg.user_id.0, error = %e, "failed to handle chat event");
            let _ = self
                .messenger
                .send_html(
                    msg.chat_id,
                    "❌ Something went wrong handling that. Please try again.",
                )
                .await;
        }
        Ok(())
    }

    async fn dispatch_inner(&self, msg: &IncomingMessage) -> Result<()> {
        let text = msg.text.trim();

        if text.starts_with('/') {
            let (cmd, rest) = parse_command(text);
            return match cmd.as_str() {
                "start" => self.send(msg.chat_id, &welcome_text()).await,
                "help" => self.send(msg.chat_id, &help_text()).await,
                "configure" => self.handle_configure(msg, &rest).await,
                "note" => self.handle_create(msg, &rest, NoteKind::Note).await,
                "blinko" => self.handle_create(msg, &rest, NoteKind::Blinko).await,
                "status" => self.handle_status(msg).await,
                "reset" => self.handle_reset(msg).await,
                _ => {
                    self.send(
                        msg.chat_id,
                        "Unknown command. Use /help to see what I can do.",
                    )
                    .await
                }
            };
        }

        if let Some(reply_to) = msg.reply_to {
            return self.handle_reply(msg, reply_to, text).await;
        }

        // Plain text outside a reply is not addressed to the relay.
        Ok(())
    }

    async fn handle_configure(&self, msg: &IncomingMessage, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return self
                .send(
                    msg.chat_id,
                    "❗ Please provide your Blinko API token.\n\nUsage: /configure &lt;token&gt;",
                )
                .await;
        }
        if token.len() < MIN_TOKEN_LEN {
            return self
                .send(
                    msg.chat_id,
                    "❗ That token looks too short. Please check it and try again.",
                )
                .await;
        }

        // Test the token against the remote before storing it.
        match self.notes.verify(token).await {
            Ok(()) => {}
            Err(Error::Auth) => {
                return self
                    .send(
                        msg.chat_id,
                        "❌ <b>Invalid token</b>\n\nThe token was rejected. Check that it is \
                         copied correctly and has not expired.",
                    )
                    .await;
            }
            Err(e) => return self.report_failure(msg.chat_id, "verify your token", e).await,
        }

        if let Err(e) = self.vault.store(msg.user_id, token).await {
            tracing::error!(user_id = msg.user_id.0, error = %e, "failed to store credential");
            return self
                .send(
                    msg.chat_id,
                    "❌ Failed to store your configuration. Please try again.",
                )
                .await;
        }

        tracing::info!(user_id = msg.user_id.0, "credential configured");
        self.send(
            msg.chat_id,
            "✅ <b>Configuration successful!</b>\n\nYour token is stored encrypted. \
             Send notes with /note or /blinko.",
        )
        .await
    }

    async fn handle_create(&self, msg: &IncomingMessage, text: &str, kind: NoteKind) -> Result<()> {
        let Some(token) = self.token_for(msg.user_id).await? else {
            return self.send_configure_first(msg.chat_id).await;
        };

        let text = text.trim();
        if text.is_empty() {
            return self
                .send(
                    msg.chat_id,
                    &format!(
                        "📝 Please provide {} content.\n\nUsage: /{} &lt;your content&gt;",
                        kind.label(),
                        kind.label()
                    ),
                )
                .await;
        }

        let _ = self.messenger.send_typing(msg.chat_id).await;

        let note_id = match self.notes.create(&token, text, kind).await {
            Ok(id) => id,
            Err(e) => {
                return self
                    .report_failure(msg.chat_id, &format!("save your {}", kind.label()), e)
                    .await;
            }
        };

        let confirmation = format!(
            "✅ <b>{} saved</b> (id {})\n\n📝 {}",
            capitalize(kind.label()),
            escape_html(&note_id.0),
            escape_html(&preview(text, PREVIEW_CHARS))
        );
        let sent = self.messenger.send_html(msg.chat_id, &confirmation).await?;

        // Correlation keys on the confirmation we just sent: that is the
        // message users reply to when they want to edit this note.
        self.store
            .record(sent.chat_id, sent.message_id, &note_id, kind, &content_hash(text))
            .await?;

        tracing::info!(
            user_id = msg.user_id.0,
            note_id = %note_id.0,
            kind = kind.label(),
            "note created"
        );
        Ok(())
    }

    async fn handle_reply(
        &self,
        msg: &IncomingMessage,
        reply_to: MessageId,
        text: &str,
    ) -> Result<()> {
        // Replies to untracked messages (help text, errors, pre-wipe
        // confirmations) are not edit requests.
        let Some(record) = self.store.lookup(msg.chat_id, reply_to).await? else {
            return Ok(());
        };

        let Some(token) = self.token_for(msg.user_id).await? else {
            return self.send_configure_first(msg.chat_id).await;
        };

        if text.is_empty() {
            return self
                .send(msg.chat_id, "❗ Update content cannot be empty.")
                .await;
        }

        let _ = self.messenger.send_typing(msg.chat_id).await;

        match self.notes.update(&token, &record.note_id, text, record.kind).await {
            Ok(returned_id) => {
                if returned_id != record.note_id {
                    // Some deployments reissue ids on edit; rebind first so
                    // the mapping never points at a dead id.
                    self.store
                        .update_remote_id(msg.chat_id, reply_to, &returned_id)
                        .await?;
                }
                self.store
                    .record(
                        msg.chat_id,
                        reply_to,
                        &returned_id,
                        record.kind,
                        &content_hash(text),
                    )
                    .await?;

                tracing::info!(
                    user_id = msg.user_id.0,
                    note_id = %returned_id.0,
                    "note updated via reply"
                );
                self.send(
                    msg.chat_id,
                    &format!(
                        "✅ <b>{} updated</b>\n\n📝 {}",
                        capitalize(record.kind.label()),
                        escape_html(&preview(text, PREVIEW_CHARS))
                    ),
                )
                .await
            }
            Err(Error::NotFound) => {
                // The remote note is gone; honor the user's intent with a
                // fresh create and rebind the same confirmation message.
                let new_id = match self.notes.create(&token, text, record.kind).await {
                    Ok(id) => id,
                    Err(e) => {
                        return self
                            .report_failure(
                                msg.chat_id,
                                &format!("recreate your {}", record.kind.label()),
                                e,
                            )
                            .await;
                    }
                };
                self.store
                    .record(msg.chat_id, reply_to, &new_id, record.kind, &content_hash(text))
                    .await?;

                tracing::info!(
                    user_id = msg.user_id.0,
                    note_id = %new_id.0,
                    "stale note recreated via reply"
                );
                self.send(
                    msg.chat_id,
                    &format!(
                        "✅ <b>{} recreated</b> (id {})\n\nThe original note no longer existed.\n\n📝 {}",
                        capitalize(record.kind.label()),
                        escape_html(&new_id.0),
                        escape_html(&preview(text, PREVIEW_CHARS))
                    ),
                )
                .await
            }
            Err(e) => {
                self.report_failure(
                    msg.chat_id,
                    &format!("update your {}", record.kind.label()),
                    e,
                )
                .await
            }
        }
    }

    async fn handle_status(&self, msg: &IncomingMessage) -> Result<()> {
        if !self.vault.has_credential(msg.user_id).await? {
            return self
                .send(
                    msg.chat_id,
                    "❌ <b>Not configured</b>\n\nSet up your Blinko token with /configure &lt;token&gt;.",
                )
                .await;
        }

        // Live check; the token itself is never echoed back.
        let token_state = match self.token_for(msg.user_id).await? {
            None => "Unreadable — reconfigure with /configure",
            Some(token) => match self.notes.verify(&token).await {
                Ok(()) => "Active",
                Err(Error::Auth) => "Invalid or expired",
                Err(_) => "Unknown (server unreachable)",
            },
        };

        let configured_date: String = self
            .vault
            .configured_at(msg.user_id)
            .await?
            .unwrap_or_default()
            .chars()
            .take(10)
            .collect();

        self.send(
            msg.chat_id,
            &format!(
                "🔑 <b>Configuration status</b>\n\nToken: {token_state}\nConfigured: {configured_date}"
            ),
        )
        .await
    }

    async fn handle_reset(&self, msg: &IncomingMessage) -> Result<()> {
        // Idempotent. Correlations are kept: earlier confirmations become
        // repliable again once the user reconfigures.
        self.vault.remove(msg.user_id).await?;
        tracing::info!(user_id = msg.user_id.0, "credential removed");
        self.send(
            msg.chat_id,
            "✅ <b>Configuration removed</b>\n\nYour token was deleted. \
             Use /configure &lt;token&gt; to set it up again.",
        )
        .await
    }

    /// Decrypt failures degrade to "not configured" (rotated key or corrupt
    /// row) instead of propagating.
    async fn token_for(&self, user_id: UserId) -> Result<Option<String>> {
        match self.vault.retrieve(user_id).await {
            Ok(token) => Ok(token),
            Err(Error::Decryption(reason)) => {
                tracing::warn!(
                    user_id = user_id.0,
                    %reason,
                    "stored credential unreadable; treating as unconfigured"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Map an internal failure to a short user-visible message.
    async fn report_failure(&self, chat_id: ChatId, what: &str, err: Error) -> Result<()> {
        tracing::error!(error = %err, "remote call failed while trying to {what}");
        let text = match err {
            Error::Auth => "❌ <b>Authentication failed</b>\n\nYour token appears to be invalid \
                            or expired. Reconfigure with /configure &lt;new token&gt;."
                .to_string(),
            Error::Network(_) => format!(
                "❌ <b>Connection problem</b>\n\nCould not reach the Blinko server to {what}. \
                 Please try again."
            ),
            Error::Server { status } => format!(
                "❌ <b>Server error</b>\n\nThe Blinko server answered with status {status}. \
                 Please try again later."
            ),
            Error::NotFound => format!("❌ The note to {what} no longer exists."),
            Error::Storage(_) => "❌ Temporary storage failure. Please try again.".to_string(),
            _ => format!("❌ Failed to {what}. Please try again."),
        };
        self.send(chat_id, &text).await
    }

    async fn send_configure_first(&self, chat_id: ChatId) -> Result<()> {
        self.send(
            chat_id,
            "❗ <b>Token not configured</b>\n\nYou must configure your Blinko token first. \
             Use /configure &lt;token&gt; to get started.",
        )
        .await
    }

    async fn send(&self, chat_id: ChatId, html: &str) -> Result<()> {
        self.messenger.send_html(chat_id, html).await.map(|_| ())
    }
}

/// Split `/cmd@botname arg1 ...` into a lowercase command and its argument
/// string.
fn parse_command(text: &str) -> (String, String) {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn welcome_text() -> String {
    [
        "👋 <b>Welcome to the Blinko relay bot!</b>",
        "",
        "I save your notes to your Blinko server.",
        "",
        "<b>Quick setup</b>",
        "1. Get your Blinko API token",
        "2. Send /configure &lt;your token&gt;",
        "3. Save notes with /note or /blinko",
        "",
        "💡 Reply to one of my confirmations to edit that note.",
        "",
        "Use /help for the full command list.",
    ]
    .join("\n")
}

fn help_text() -> String {
    [
        "🤖 <b>Commands</b>",
        "",
        "/configure &lt;token&gt; — store your Blinko API token (encrypted)",
        "/note &lt;text&gt; — save a note",
        "/blinko &lt;text&gt; — save a blinko",
        "/status — check your configuration",
        "/reset — delete your stored token",
        "",
        "Reply to one of my confirmation messages with new text to update \
         that note instead of creating a new one.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageRef, NoteId};
    use crate::storage;
    use crate::vault::CipherKey;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq)]
    enum ClientCall {
        Create {
            token: String,
            text: String,
            kind: NoteKind,
        },
        Update {
            token: String,
            note_id: String,
            text: String,
        },
        Verify {
            token: String,
        },
    }

    #[derive(Default)]
    struct FakeNotes {
        calls: Mutex<Vec<ClientCall>>,
        next_create_id: Mutex<Option<String>>,
        next_update_error: Mutex<Option<Error>>,
        next_update_id: Mutex<Option<String>>,
    }

    impl FakeNotes {
        fn calls(&self) -> Vec<ClientCall> {
            self.calls.lock().unwrap().clone()
        }

        fn creates(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, ClientCall::Create { .. }))
                .count()
        }

        fn updates(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, ClientCall::Update { .. }))
                .count()
        }

        fn queue_create_id(&self, id: &str) {
            *self.next_create_id.lock().unwrap() = Some(id.to_string());
        }

        fn fail_next_update(&self, err: Error) {
            *self.next_update_error.lock().unwrap() = Some(err);
        }

        fn reissue_on_next_update(&self, id: &str) {
            *self.next_update_id.lock().unwrap() = Some(id.to_string());
        }
    }

    #[async_trait]
    impl NoteClient for FakeNotes {
        async fn create(&self, token: &str, text: &str, kind: NoteKind) -> Result<NoteId> {
            self.calls.lock().unwrap().push(ClientCall::Create {
                token: token.to_string(),
                text: text.to_string(),
                kind,
            });
            let id = self
                .next_create_id
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| "101".to_string());
            Ok(NoteId(id))
        }

        async fn update(
            &self,
            token: &str,
            note_id: &NoteId,
            text: &str,
            _kind: NoteKind,
        ) -> Result<NoteId> {
            self.calls.lock().unwrap().push(ClientCall::Update {
                token: token.to_string(),
                note_id: note_id.0.clone(),
                text: text.to_string(),
            });
            if let Some(err) = self.next_update_error.lock().unwrap().take() {
                return Err(err);
            }
            let id = self
                .next_update_id
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| note_id.0.clone());
            Ok(NoteId(id))
        }

        async fn verify(&self, token: &str) -> Result<()> {
            self.calls.lock().unwrap().push(ClientCall::Verify {
                token: token.to_string(),
            });
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeMessenger {
        next_id: Mutex<i32>,
        sent: Mutex<Vec<(ChatId, String)>>,
    }

    impl FakeMessenger {
        fn sent_html(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(_, h)| h.clone()).collect()
        }

        fn last_html(&self) -> String {
            self.sent_html().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
            self.sent.lock().unwrap().push((chat_id, html.to_string()));
            let mut guard = self.next_id.lock().unwrap();
            *guard += 1;
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(*guard),
            })
        }

        async fn send_typing(&self, _chat_id: ChatId) -> Result<()> {
            Ok(())
        }
    }

    struct Harness {
        dispatcher: Dispatcher,
        store: CorrelationStore,
        vault: CredentialVault,
        notes: Arc<FakeNotes>,
        messenger: Arc<FakeMessenger>,
    }

    async fn harness() -> Harness {
        let pool = storage::open_in_memory().await.unwrap();
        let vault = CredentialVault::new(pool.clone(), CipherKey::generate());
        let store = CorrelationStore::new(pool);
        let notes = Arc::new(FakeNotes::default());
        let messenger = Arc::new(FakeMessenger::default());
        let dispatcher = Dispatcher::new(
            vault.clone(),
            store.clone(),
            notes.clone(),
            messenger.clone(),
        );
        Harness {
            dispatcher,
            store,
            vault,
            notes,
            messenger,
        }
    }

    fn msg(user: i64, text: &str) -> IncomingMessage {
        IncomingMessage {
            chat_id: ChatId(user),
            user_id: UserId(user),
            text: text.to_string(),
            reply_to: None,
        }
    }

    fn reply(user: i64, text: &str, reply_to: i32) -> IncomingMessage {
        IncomingMessage {
            reply_to: Some(MessageId(reply_to)),
            ..msg(user, text)
        }
    }

    #[tokio::test]
    async fn note_while_unconfigured_never_calls_the_client() {
        let h = harness().await;
        h.dispatcher.dispatch(&msg(1, "/note buy milk")).await.unwrap();

        assert!(h.notes.calls().is_empty());
        assert!(h.messenger.last_html().contains("configure"));
    }

    #[tokio::test]
    async fn configure_then_note_then_reply_updates_in_place() {
        let h = harness().await;

        h.dispatcher
            .dispatch(&msg(1, "/configure abc123defg"))
            .await
            .unwrap();
        h.dispatcher.dispatch(&msg(1, "/note buy milk")).await.unwrap();

        // Messages so far: configure confirmation (1), note confirmation (2).
        let confirmation_id = 2;
        let rec = h
            .store
            .lookup(ChatId(1), MessageId(confirmation_id))
            .await
            .unwrap()
            .expect("confirmation should be tracked");
        assert_eq!(rec.note_id, NoteId("101".into()));
        assert_eq!(rec.content_hash, content_hash("buy milk"));

        h.dispatcher
            .dispatch(&reply(1, "buy milk and eggs", confirmation_id))
            .await
            .unwrap();

        assert_eq!(h.notes.updates(), 1, "exactly one update call");
        assert_eq!(h.notes.creates(), 1, "no create for a tracked reply");
        assert!(h.notes.calls().contains(&ClientCall::Update {
            token: "abc123defg".to_string(),
            note_id: "101".to_string(),
            text: "buy milk and eggs".to_string(),
        }));

        // Same record, refreshed hash, unchanged remote id.
        let rec = h
            .store
            .lookup(ChatId(1), MessageId(confirmation_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rec.note_id, NoteId("101".into()));
        assert_eq!(rec.content_hash, content_hash("buy milk and eggs"));

        // The "updated" confirmation (message 3) is not tracked.
        assert!(h
            .store
            .lookup(ChatId(1), MessageId(3))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn stale_remote_id_falls_back_to_exactly_one_create() {
        let h = harness().await;
        h.dispatcher
            .dispatch(&msg(1, "/configure abc123defg"))
            .await
            .unwrap();
        h.dispatcher.dispatch(&msg(1, "/note buy milk")).await.unwrap();

        h.notes.fail_next_update(Error::NotFound);
        h.notes.queue_create_id("202");
        h.dispatcher.dispatch(&reply(1, "buy oat milk", 2)).await.unwrap();

        assert_eq!(h.notes.updates(), 1);
        assert_eq!(h.notes.creates(), 2, "initial create plus one fallback");

        // Correlation rebound to the new id under the same confirmation.
        let rec = h.store.lookup(ChatId(1), MessageId(2)).await.unwrap().unwrap();
        assert_eq!(rec.note_id, NoteId("202".into()));
        assert_eq!(rec.content_hash, content_hash("buy oat milk"));
    }

    #[tokio::test]
    async fn reissued_id_on_update_rebinds_the_correlation() {
        let h = harness().await;
        h.dispatcher
            .dispatch(&msg(1, "/configure abc123defg"))
            .await
            .unwrap();
        h.dispatcher.dispatch(&msg(1, "/note buy milk")).await.unwrap();

        h.notes.reissue_on_next_update("777");
        h.dispatcher.dispatch(&reply(1, "buy milk!", 2)).await.unwrap();

        let rec = h.store.lookup(ChatId(1), MessageId(2)).await.unwrap().unwrap();
        assert_eq!(rec.note_id, NoteId("777".into()));
    }

    #[tokio::test]
    async fn reply_to_untracked_message_is_ignored() {
        let h = harness().await;
        h.dispatcher
            .dispatch(&msg(1, "/configure abc123defg"))
            .await
            .unwrap();

        let sent_before = h.messenger.sent_html().len();
        h.dispatcher.dispatch(&reply(1, "some new text", 99)).await.unwrap();

        assert_eq!(h.notes.creates(), 0);
        assert_eq!(h.notes.updates(), 0);
        assert_eq!(h.messenger.sent_html().len(), sent_before, "no reply sent");
    }

    #[tokio::test]
    async fn blinko_command_passes_the_kind_through() {
        let h = harness().await;
        h.dispatcher
            .dispatch(&msg(1, "/configure abc123defg"))
            .await
            .unwrap();
        h.dispatcher
            .dispatch(&msg(1, "/blinko remember the milk"))
            .await
            .unwrap();

        assert!(h.notes.calls().contains(&ClientCall::Create {
            token: "abc123defg".to_string(),
            text: "remember the milk".to_string(),
            kind: NoteKind::Blinko,
        }));

        let rec = h.store.lookup(ChatId(1), MessageId(2)).await.unwrap().unwrap();
        assert_eq!(rec.kind, NoteKind::Blinko);
    }

    #[tokio::test]
    async fn users_only_ever_use_their_own_tokens() {
        let h = harness().await;
        h.dispatcher
            .dispatch(&msg(1, "/configure token-for-one"))
            .await
            .unwrap();
        h.dispatcher
            .dispatch(&msg(2, "/configure token-for-two"))
            .await
            .unwrap();

        h.dispatcher.dispatch(&msg(1, "/note from one")).await.unwrap();
        h.dispatcher.dispatch(&msg(2, "/note from two")).await.unwrap();

        for call in h.notes.calls() {
            if let ClientCall::Create { token, text, .. } = call {
                match text.as_str() {
                    "from one" => assert_eq!(token, "token-for-one"),
                    "from two" => assert_eq!(token, "token-for-two"),
                    other => panic!("unexpected create text: {other}"),
                }
            }
        }
    }

    #[tokio::test]
    async fn configure_rejects_empty_and_short_tokens() {
        let h = harness().await;

        h.dispatcher.dispatch(&msg(1, "/configure")).await.unwrap();
        assert!(h.messenger.last_html().contains("provide"));

        h.dispatcher.dispatch(&msg(1, "/configure short")).await.unwrap();
        assert!(h.messenger.last_html().contains("too short"));

        assert!(h.notes.calls().is_empty(), "no verify for rejected tokens");
        assert!(!h.vault.has_credential(UserId(1)).await.unwrap());
    }

    #[tokio::test]
    async fn empty_note_content_is_rejected_without_a_remote_call() {
        let h = harness().await;
        h.dispatcher
            .dispatch(&msg(1, "/configure abc123defg"))
            .await
            .unwrap();
        h.dispatcher.dispatch(&msg(1, "/note")).await.unwrap();

        assert_eq!(h.notes.creates(), 0);
        assert!(h.messenger.last_html().contains("provide note content"));
    }

    #[tokio::test]
    async fn reset_is_idempotent_and_requires_reconfigure() {
        let h = harness().await;
        h.dispatcher
            .dispatch(&msg(1, "/configure abc123defg"))
            .await
            .unwrap();
        h.dispatcher.dispatch(&msg(1, "/reset")).await.unwrap();
        h.dispatcher.dispatch(&msg(1, "/reset")).await.unwrap();

        assert!(!h.vault.has_credential(UserId(1)).await.unwrap());

        h.dispatcher.dispatch(&msg(1, "/note hello")).await.unwrap();
        assert_eq!(h.notes.creates(), 0);
        assert!(h.messenger.last_html().contains("configure"));
    }

    #[tokio::test]
    async fn status_reports_without_revealing_the_token() {
        let h = harness().await;

        h.dispatcher.dispatch(&msg(1, "/status")).await.unwrap();
        assert!(h.messenger.last_html().contains("Not configured"));

        h.dispatcher
            .dispatch(&msg(1, "/configure super-secret-token"))
            .await
            .unwrap();
        h.dispatcher.dispatch(&msg(1, "/status")).await.unwrap();

        let status = h.messenger.last_html();
        assert!(status.contains("Active"));
        assert!(!status.contains("super-secret-token"));
    }

    #[tokio::test]
    async fn rotated_key_degrades_to_unconfigured() {
        let pool = storage::open_in_memory().await.unwrap();
        let old_vault = CredentialVault::new(pool.clone(), CipherKey::generate());
        old_vault.store(UserId(1), "sealed-elsewhere").await.unwrap();

        let notes = Arc::new(FakeNotes::default());
        let messenger = Arc::new(FakeMessenger::default());
        let dispatcher = Dispatcher::new(
            CredentialVault::new(pool.clone(), CipherKey::generate()),
            CorrelationStore::new(pool),
            notes.clone(),
            messenger.clone(),
        );

        dispatcher.dispatch(&msg(1, "/note hello")).await.unwrap();

        assert_eq!(notes.creates(), 0);
        assert!(messenger.last_html().contains("configure"));
    }

    #[test]
    fn parse_command_strips_bot_mentions_and_lowercases() {
        assert_eq!(
            parse_command("/Note@my_bot buy milk"),
            ("note".to_string(), "buy milk".to_string())
        );
        assert_eq!(parse_command("/status"), ("status".to_string(), String::new()));
    }
}
