use {
    std::io,
    clap::Parser as _,
    futures::future::FutureExt as _,
    rocket::Rocket,
    tokio_util::sync::CancellationToken,
    crate::{
        config::{
            Config,
            ConfigDiscord,
        },
        monitor::MonitorSession,
        notify::{
            DiscordSink,
            LogSink,
            NotificationSink,
        },
        prelude::*,
        startgg::HttpTransport,
    },
};

mod bracket;
mod config;
mod http;
mod monitor;
mod notify;
mod outcome;
mod prelude;
mod record;
mod seed_rank;
mod startgg;
mod upset;

const DEFAULT_PORT: u16 = 8000;

#[derive(clap::Parser)]
#[clap(version)]
struct Args {
    /// Read the config from this file instead of the default location
    #[clap(long)]
    config: Option<PathBuf>,
    #[clap(long)]
    port: Option<u16>,
    #[clap(subcommand)]
    subcommand: Option<Subcommand>,
}

/// Without a subcommand, both run side by side.
#[derive(Clone, Copy, clap::Subcommand)]
enum Subcommand {
    /// Only watch the configured event for upsets
    Monitor,
    /// Only serve the upset record API
    Serve,
}

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error(transparent)] Config(#[from] config::Error),
    #[error(transparent)] Io(#[from] io::Error),
    #[error(transparent)] Reqwest(#[from] reqwest::Error),
    #[error(transparent)] Rocket(#[from] rocket::Error),
    #[error(transparent)] Sql(#[from] sqlx::Error),
    #[error(transparent)] Task(#[from] tokio::task::JoinError),
}

fn notification_sink(discord: Option<&ConfigDiscord>) -> Box<dyn NotificationSink> {
    match discord {
        Some(ConfigDiscord { bot_token, channel_id }) if !bot_token.is_empty() => Box::new(DiscordSink::new(bot_token, *channel_id)),
        Some(_) => {
            log::warn!("Discord channel configured without a bot token, notifications will only be logged");
            Box::new(LogSink)
        }
        None => {
            log::info!("no Discord channel configured, notifications will only be logged");
            Box::new(LogSink)
        }
    }
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    let Args { config, port, subcommand } = Args::parse();
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
    let default_panic_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log::error!("thread panic: {info:?}");
        default_panic_hook(info)
    }));
    let config = Config::load(config.as_deref()).await?;
    let shutdown = CancellationToken::new();
    let rocket = if let Some(Subcommand::Monitor) = subcommand {
        None
    } else {
        let db_pool = record::connect(&config.database.path).await?;
        Some(http::rocket(db_pool, port.unwrap_or(DEFAULT_PORT)).ignite().await?)
    };
    let monitor = if let Some(Subcommand::Serve) = subcommand {
        None
    } else {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("upset-monitor/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .use_rustls_tls()
            .hickory_dns(true)
            .build()?;
        let client = startgg::Client::new(HttpTransport::new(http_client, config.api_endpoint.clone(), config.startgg.clone()), config.per_page);
        Some((MonitorSession::new(config.event.clone()), client, notification_sink(config.discord.as_ref())))
    };
    // the monitor follows the record API's shutdown, or stops on ctrl-c when running alone
    let stop_signal = {
        let rocket_shutdown = rocket.as_ref().map(|rocket| rocket.shutdown());
        let shutdown = shutdown.clone();
        async move {
            match rocket_shutdown {
                Some(rocket_shutdown) => rocket_shutdown.await,
                None => tokio::signal::ctrl_c().await?,
            }
            shutdown.cancel();
            Ok::<_, Error>(())
        }
    };
    let poll_interval = config.poll_interval();
    let monitor_task = tokio::spawn(async move {
        if let Some((session, client, sink)) = monitor {
            log::info!("watching {} for upsets every {poll_interval:?}", session.event);
            monitor::run(session, client, &*sink, poll_interval, shutdown).await;
        }
    }).map(|res| res.map_err(Error::Task));
    let rocket_task = tokio::spawn(async move {
        match rocket {
            Some(rocket) => rocket.launch().await.map(|Rocket { .. }| ()),
            None => Ok(()),
        }
    }).map(|res| match res {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::from(e)),
        Err(e) => Err(Error::from(e)),
    });
    let ((), (), ()) = tokio::try_join!(monitor_task, rocket_task, stop_signal)?;
    Ok(())
}
