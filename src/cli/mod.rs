//! CLI subcommand definitions and handlers.
//!
//! Uses clap derive to define the subcommands:
//! - `run` (default) -- start the bot
//! - `check` -- print tool availability and limits without contacting Telegram
//! - `version` -- print build/version info

use std::path::Path;

use clap::{Parser, Subcommand};

use crate::config::BotConfig;

/// Telegram bot that fetches Instagram videos.
#[derive(Parser, Debug)]
#[command(
    name = "reelgrab",
    version = env!("CARGO_PKG_VERSION"),
    about = "Telegram bot that delivers Instagram videos within Telegram's size limits"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start the bot (default when no subcommand is given).
    Run,

    /// Load the configuration and report which external tools are available.
    Check,

    /// Print version, build date, and git commit information.
    Version,
}

// ---------------------------------------------------------------------------
// Subcommand handlers
// ---------------------------------------------------------------------------

/// Run the `check` subcommand.
pub fn handle_check() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = BotConfig::from_env()?;
    print!("{}", check_report(&cfg, |bin| which::which(bin).is_ok()));
    Ok(())
}

/// Run the `version` subcommand.
pub fn handle_version() {
    println!("reelgrab {}", env!("CARGO_PKG_VERSION"));
    println!("  Build date: {}", env!("REELGRAB_BUILD_DATE"));
    println!("  Git commit: {}", env!("REELGRAB_GIT_HASH"));
    println!(
        "  Platform:   {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_report(cfg: &BotConfig, resolves: impl Fn(&Path) -> bool) -> String {
    let tool = |bin: &Path| {
        let state = if resolves(bin) { "found" } else { "MISSING" };
        format!("{} ({state})", bin.display())
    };
    let deadline = |d: Option<std::time::Duration>| match d {
        Some(d) => format!("{}s", d.as_secs()),
        None => "none".to_string(),
    };

    let mut out = String::new();
    out.push_str(&format!("Bot API:           {}\n", cfg.api_base_url));
    out.push_str(&format!("yt-dlp:            {}\n", tool(&cfg.ytdlp_bin)));
    out.push_str(&format!("ffmpeg:            {}\n", tool(&cfg.ffmpeg_bin)));
    out.push_str(&format!("ffprobe:           {}\n", tool(&cfg.ffprobe_bin)));
    out.push_str(&format!("Inline limit:      {} MB\n", cfg.inline_limit_mb));
    out.push_str(&format!("Document limit:    {} MB\n", cfg.document_limit_mb));
    out.push_str(&format!("Compress target:   {} MB\n", cfg.compress_target_mb));
    out.push_str(&format!("Fetch timeout:     {}\n", deadline(cfg.fetch_timeout)));
    out.push_str(&format!("Transcode timeout: {}\n", deadline(cfg.transcode_timeout)));
    out.push_str(&format!(
        "Concurrent jobs:   {}\n",
        cfg.max_concurrent_jobs
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["reelgrab"]).unwrap();
        assert_eq!(cli.command, None);
    }

    #[test]
    fn test_subcommands_parse() {
        let cli = Cli::try_parse_from(["reelgrab", "check"]).unwrap();
        assert_eq!(cli.command, Some(Command::Check));
        let cli = Cli::try_parse_from(["reelgrab", "run"]).unwrap();
        assert_eq!(cli.command, Some(Command::Run));
        assert!(Cli::try_parse_from(["reelgrab", "serve"]).is_err());
    }

    #[test]
    fn test_check_report() {
        let cfg = BotConfig::from_lookup(|key| match key {
            "BOT_TOKEN" => Some("t".to_string()),
            "FETCH_TIMEOUT_SECS" => Some("120".to_string()),
            _ => None,
        })
        .unwrap();
        let report = check_report(&cfg, |bin| bin != PathBuf::from("ffmpeg").as_path());
        assert!(report.contains("yt-dlp:            yt-dlp (found)"));
        assert!(report.contains("ffmpeg:            ffmpeg (MISSING)"));
        assert!(report.contains("Inline limit:      50 MB"));
        assert!(report.contains("Fetch timeout:     120s"));
        assert!(report.contains("Transcode timeout: none"));
        assert!(report.contains("Concurrent jobs:   unbounded"));
    }
}
