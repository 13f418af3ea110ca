use {
    async_trait::async_trait,
    serenity::{
        http::Http,
        model::id::ChannelId,
    },
    crate::prelude::*,
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Serenity(#[from] serenity::Error),
}

/// Where the monitor's messages go. The monitor only decides what to say.
#[async_trait]
pub(crate) trait NotificationSink: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), Error>;
}

/// Posts to a Discord channel using the bot's REST credentials, without connecting to the gateway.
pub(crate) struct DiscordSink {
    http: Arc<Http>,
    channel: ChannelId,
}

impl DiscordSink {
    pub(crate) fn new(bot_token: &str, channel: ChannelId) -> Self {
        Self {
            http: Arc::new(Http::new(bot_token)),
            channel,
        }
    }
}

#[async_trait]
impl NotificationSink for DiscordSink {
    async fn send(&self, text: &str) -> Result<(), Error> {
        self.channel.say(&*self.http, text).await?;
        Ok(())
    }
}

/// Dry run: writes notifications to the log instead of sending them anywhere.
pub(crate) struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, text: &str) -> Result<(), Error> {
        log::info!("notification: {text}");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use {
        std::sync::Mutex,
        super::*,
    };

    #[derive(Default)]
    pub(crate) struct RecordingSink {
        sent: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        pub(crate) fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send(&self, text: &str) -> Result<(), Error> {
            self.sent.lock().unwrap().push(text.to_owned());
            Ok(())
        }
    }
}
