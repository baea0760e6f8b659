use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use reelgrab::channels::{receive_loop, TelegramClient};
use reelgrab::cli::{self, Cli, Command};
use reelgrab::config::BotConfig;
use reelgrab::exec::WorkerPool;
use reelgrab::handler::RequestHandler;
use reelgrab::logging::{self, TracingConfig};
use reelgrab::media::{FfmpegTranscoder, Transcoder, YtDlpFetcher};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        // No subcommand or explicit `run` both start the bot.
        None | Some(Command::Run) => run_bot().await,

        Some(Command::Check) => cli::handle_check(),

        Some(Command::Version) => {
            cli::handle_version();
            Ok(())
        }
    }
}

async fn run_bot() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_tracing(&TracingConfig::from_env()?)?;

    let config = Arc::new(BotConfig::from_env()?);
    let pool = WorkerPool::from_limit(config.max_concurrent_jobs);

    let transcoder = FfmpegTranscoder::from_config(&config, pool.clone());
    if !transcoder.is_available() {
        warn!(
            ffmpeg = %config.ffmpeg_bin.display(),
            "ffmpeg not found, oversized videos will be sent as documents"
        );
    }
    let fetcher = YtDlpFetcher::from_config(&config, pool);

    let client = Arc::new(TelegramClient::new(&config.api_base_url, &config.bot_token)?);
    let me = client.get_me().await?;
    info!(
        bot_id = me.id,
        username = me.username.as_deref().unwrap_or("?"),
        "authenticated with Telegram"
    );
    client.delete_webhook(true).await?;

    let mut handler =
        RequestHandler::new(Arc::clone(&config), client.clone(), Arc::new(fetcher))
            .with_transcoder(Arc::new(transcoder));
    if let Some(username) = me.username {
        handler = handler.with_bot_username(username);
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let receiver = tokio::spawn(receive_loop(client, Arc::new(handler), shutdown_rx));

    info!(
        inline_limit_mb = config.inline_limit_mb,
        document_limit_mb = config.document_limit_mb,
        "bot is running, press Ctrl-C to stop"
    );
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    let _ = shutdown_tx.send(true);
    receiver.await?;
    Ok(())
}
