// src/commands/bot.rs

//! Telegram long-polling front end for `CommandHandle`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::commands::{Command, CommandHandle};
use crate::services::telegram::{TelegramClient, Update};

const POLL_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Answers chat commands from the configured chat only.
pub struct CommandBot {
    client: TelegramClient,
    chat_id: String,
    handle: CommandHandle,
    poll_timeout: Duration,
}

impl CommandBot {
    pub fn new(
        client: TelegramClient,
        chat_id: impl Into<String>,
        handle: CommandHandle,
    ) -> Self {
        Self {
            client,
            chat_id: chat_id.into().trim().to_string(),
            handle,
            poll_timeout: POLL_TIMEOUT,
        }
    }

    /// Poll until `cancel` fires. A pending long poll is abandoned at once;
    /// a command already being answered completes first.
    pub async fn run(self, cancel: CancellationToken) {
        log::info!("Command bot polling for chat {}", self.chat_id);
        let mut offset = None;

        loop {
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                polled = self.client.get_updates(offset, self.poll_timeout) => polled,
            };

            let updates = match polled {
                Ok(updates) => updates,
                Err(e) => {
                    log::warn!("getUpdates failed: {}", e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(ERROR_BACKOFF) => continue,
                    }
                }
            };

            for update in updates {
                offset = Some(update.update_id + 1);
                if cancel.is_cancelled() {
                    break;
                }
                self.handle_update(update).await;
            }
        }

        log::info!("Command bot stopped");
    }

    async fn handle_update(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        if !self.is_authorized(message.chat.id) {
            log::debug!("Ignoring message from chat {}", message.chat.id);
            return;
        }
        let Some(command) = message.text.as_deref().and_then(Command::parse) else {
            return;
        };

        log::info!("Command {:?} from chat {}", command, message.chat.id);
        let reply = self.handle.execute(&command).await;
        if let Err(e) = self.client.send_message(&self.chat_id, &reply).await {
            log::warn!("Could not reply to {:?}: {}", command, e);
        }
    }

    fn is_authorized(&self, chat_id: i64) -> bool {
        self.chat_id == chat_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::{Criteria, TelegramConfig};
    use crate::pipeline::{Pipeline, Scheduler};
    use crate::services::LogNotifier;
    use crate::storage::MemoryStore;

    fn bot(chat_id: &str) -> (CommandBot, Scheduler) {
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(MemoryStore::new()),
            vec![],
            Arc::new(LogNotifier),
            Criteria::default(),
        ));
        let scheduler = Scheduler::new(Arc::clone(&pipeline), Duration::from_secs(60));
        let handle = CommandHandle::new(pipeline, scheduler.handle());
        let client = TelegramClient::new(reqwest::Client::new(), &TelegramConfig::default());
        (CommandBot::new(client, chat_id, handle), scheduler)
    }

    #[test]
    fn only_configured_chat_is_authorized() {
        let (bot, _scheduler) = bot(" -100200300 ");
        assert!(bot.is_authorized(-100200300));
        assert!(!bot.is_authorized(42));
    }

    #[tokio::test]
    async fn stops_when_cancelled() {
        let (bot, _scheduler) = bot("1");
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), bot.run(cancel))
            .await
            .unwrap();
    }
}
