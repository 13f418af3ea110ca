use {
    std::{
        env,
        io,
    },
    serenity::model::id::ChannelId,
    tokio::fs,
    url::Url,
    crate::{
        prelude::*,
        startgg::{
            self,
            EventRef,
        },
    },
};
#[cfg(unix)] use xdg::BaseDirectories;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("failed to read config file at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source] source: io::Error,
    },
    #[error(transparent)] Json(#[from] serde_json::Error),
    #[cfg(unix)]
    #[error("missing config file")]
    Missing,
    #[error("no start.gg API token configured")]
    MissingStartggToken,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Config {
    /// API token, may be left empty if given as `STARTGG_TOKEN` instead.
    #[serde(default)]
    pub(crate) startgg: String,
    pub(crate) event: EventRef,
    #[serde(default)]
    pub(crate) discord: Option<ConfigDiscord>,
    #[serde(default = "default_poll_interval_secs")]
    pub(crate) poll_interval_secs: u64,
    #[serde(default = "default_per_page")]
    pub(crate) per_page: i64,
    #[serde(default = "default_api_endpoint")]
    pub(crate) api_endpoint: Url,
    #[serde(default)]
    pub(crate) database: ConfigDatabase,
}

fn default_poll_interval_secs() -> u64 { 10 }
fn default_per_page() -> i64 { startgg::DEFAULT_PER_PAGE }

fn default_api_endpoint() -> Url {
    Url::parse(startgg::DEFAULT_ENDPOINT).expect("default start.gg endpoint is a valid URL")
}

impl Config {
    pub(crate) async fn load(path: Option<&Path>) -> Result<Self, Error> {
        let path = match path {
            Some(path) => path.to_owned(),
            None => default_path()?,
        };
        let buf = fs::read_to_string(&path).await.map_err(|source| Error::Io { path: path.clone(), source })?;
        serde_json::from_str::<Self>(&buf)?.with_overrides(env::var("STARTGG_TOKEN").ok(), env::var("DISCORD_TOKEN").ok())
    }

    /// Applies tokens passed through the environment, which take precedence over the config file.
    fn with_overrides(mut self, startgg_token: Option<String>, discord_token: Option<String>) -> Result<Self, Error> {
        if let Some(token) = startgg_token.filter(|token| !token.is_empty()) {
            self.startgg = token;
        }
        if let (Some(discord), Some(token)) = (&mut self.discord, discord_token.filter(|token| !token.is_empty())) {
            discord.bot_token = token;
        }
        if self.startgg.trim().is_empty() { return Err(Error::MissingStartggToken) }
        Ok(self)
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

/// Tokens are left out.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { startgg: _, event, discord, poll_interval_secs, per_page, api_endpoint, database } = self;
        f.debug_struct("Config")
            .field("event", event)
            .field("discord", discord)
            .field("poll_interval_secs", poll_interval_secs)
            .field("per_page", per_page)
            .field("api_endpoint", api_endpoint)
            .field("database", database)
            .finish_non_exhaustive()
    }
}

#[cfg(unix)]
fn default_path() -> Result<PathBuf, Error> {
    BaseDirectories::new().find_config_file("upset-monitor.json").ok_or(Error::Missing)
}

#[cfg(not(unix))]
fn default_path() -> Result<PathBuf, Error> {
    Ok(PathBuf::from("cfg/upset-monitor.json"))
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConfigDiscord {
    #[serde(default)]
    pub(crate) bot_token: String,
    pub(crate) channel_id: ChannelId,
}

impl fmt::Debug for ConfigDiscord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigDiscord")
            .field("channel_id", &self.channel_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConfigDatabase {
    pub(crate) path: PathBuf,
}

impl Default for ConfigDatabase {
    fn default() -> Self {
        Self { path: PathBuf::from("upsets.db") }
    }
}

#[cfg(test)]
mod tests {
    use {
        serde_json::json,
        crate::startgg::ID,
        super::*,
    };

    fn parse(value: serde_json::Value) -> Config {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn defaults() {
        let config = parse(json!({ "startgg": "token", "event": "tournament/genesis-9/event/melee-singles" }));
        assert_eq!(config.event, EventRef::Slug(format!("tournament/genesis-9/event/melee-singles")));
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.per_page, 50);
        assert_eq!(config.api_endpoint.as_str(), "https://api.start.gg/gql/alpha");
        assert_eq!(config.database.path, Path::new("upsets.db"));
        assert!(config.discord.is_none());
    }

    #[test]
    fn full_config() {
        let config = parse(json!({
            "startgg": "token",
            "event": 1098765,
            "discord": { "botToken": "bot", "channelId": "123456789012345678" },
            "pollIntervalSecs": 30,
            "perPage": 20,
            "apiEndpoint": "http://localhost:8080/gql",
            "database": { "path": "/var/lib/upsets.db" },
        }));
        assert_eq!(config.event, EventRef::Id(ID::from("1098765")));
        let discord = config.discord.as_ref().unwrap();
        assert_eq!(discord.bot_token, "bot");
        assert_eq!(discord.channel_id, ChannelId::new(123456789012345678));
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.per_page, 20);
        assert_eq!(config.database.path, Path::new("/var/lib/upsets.db"));
    }

    #[test]
    fn environment_tokens_take_precedence() {
        let config = parse(json!({ "startgg": "file", "event": 1, "discord": { "channelId": 5 } }))
            .with_overrides(Some(format!("env")), Some(format!("bot")))
            .unwrap();
        assert_eq!(config.startgg, "env");
        assert_eq!(config.discord.unwrap().bot_token, "bot");
    }

    #[test]
    fn empty_token_is_rejected() {
        let config = parse(json!({ "event": 1 }));
        assert!(matches!(config.clone().with_overrides(None, None), Err(Error::MissingStartggToken)));
        assert!(matches!(config.clone().with_overrides(Some(String::default()), None), Err(Error::MissingStartggToken)));
        assert_eq!(config.with_overrides(Some(format!("env")), None).unwrap().startgg, "env");
    }

    #[test]
    fn debug_output_hides_tokens() {
        let config = parse(json!({ "startgg": "startgg-secret", "event": 1, "discord": { "botToken": "discord-secret", "channelId": 5 } }));
        let debug = format!("{config:?}");
        assert!(!debug.contains("startgg-secret"), "{debug}");
        assert!(!debug.contains("discord-secret"), "{debug}");
        assert!(debug.contains("channel_id"), "{debug}");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        assert!(matches!(Config::load(Some(Path::new("/nonexistent/upset-monitor.json"))).await, Err(Error::Io { .. })));
    }
}
