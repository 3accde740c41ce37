mod auth;
mod category;
mod cleaner;
mod config;
mod consts;
mod drive;
mod syncer;
mod util;
use crate::auth::{credentials_from_env, Authenticator};
use crate::config::SyncConfig;
use crate::consts::DEFAULT_FOLDER_ID;
use crate::drive::{http_client, DriveClient};
use crate::syncer::Syncer;
use anyhow::Context;
use clap::Parser;
use std::io::{stderr, IsTerminal};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{filter::Targets, fmt::time::OffsetTime, prelude::*};

/// Download the latest Excel report of each kind from a Google Drive folder
///
/// The folder is listed for `.xlsx`/`.xls` files, which are grouped by kind
/// (the franchise dashboard, one report per store, and everything else).
/// Existing Excel files in OUTDIR are removed, and the most recently
/// modified file of each kind is downloaded in their place.
///
/// Credentials are read from the `GOOGLE_DRIVE_CREDENTIALS` environment
/// variable, which must contain a JSON authorized-user credential with a
/// refresh token.
///
/// Exits with status 1 if no file could be downloaded.
#[derive(Clone, Debug, Parser)]
#[command(version)]
struct Arguments {
    /// Base URL of the Drive v3 API
    #[arg(long, hide = true, value_name = "URL")]
    api_url: Option<String>,

    /// Log a warning if the number of files downloaded differs from `N`
    #[arg(long, value_name = "N")]
    expect: Option<usize>,

    /// ID of the Google Drive folder to download from
    #[arg(long, default_value = DEFAULT_FOLDER_ID, value_name = "ID")]
    folder_id: String,

    /// List the file that would be downloaded for each kind instead of
    /// downloading anything
    #[arg(long)]
    list: bool,

    /// Set logging level
    #[arg(
        short,
        long,
        default_value = "INFO",
        value_name = "ERROR|WARN|INFO|DEBUG|TRACE"
    )]
    log_level: Level,

    /// Directory in which to save the downloaded files.  Defaults to
    /// `public/data`.
    outdir: Option<PathBuf>,
}

// See
// <https://docs.rs/tracing-subscriber/latest/tracing_subscriber/fmt/time/struct.OffsetTime.html#method.local_rfc_3339>
// for an explanation of the main + #[tokio::main]run thing
fn main() -> anyhow::Result<()> {
    let args = Arguments::parse();
    let timer =
        OffsetTime::local_rfc_3339().context("failed to determine local timezone offset")?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(timer)
                .with_ansi(stderr().is_terminal())
                .with_writer(stderr),
        )
        .with(
            Targets::new()
                .with_target(env!("CARGO_CRATE_NAME"), args.log_level)
                .with_default(Level::INFO.min(args.log_level)),
        )
        .init();
    run(args)
}

#[tokio::main]
async fn run(args: Arguments) -> anyhow::Result<()> {
    let r = sync(args).await;
    if let Err(ref e) = r {
        println!("{}", fail_line(e));
    }
    r
}

async fn sync(args: Arguments) -> anyhow::Result<()> {
    let mut config = SyncConfig::new(args.folder_id, args.outdir)?;
    if let Some(ref url) = args.api_url {
        config = config.with_api_base(url)?;
    }
    let http = http_client().context("failed to construct HTTP client")?;
    tracing::info!("Authenticating with Google Drive ...");
    let credential = Authenticator::new(http.clone(), config.scopes.clone())
        .obtain_credential(credentials_from_env().as_deref())
        .await?;
    tracing::debug!(expiry = ?credential.expiry(), "Obtained access token");
    let client = DriveClient::new(http, &config.api_base, credential);
    let syncer = Syncer::new(client, config);
    if args.list {
        let plan = syncer.plan().await?;
        println!("{plan}");
        return Ok(());
    }
    let report = syncer.run().await?;
    println!("{report}");
    if let Some(expected) = args.expect {
        if report.downloaded() != expected {
            tracing::warn!(
                expected,
                downloaded = report.downloaded(),
                "Number of files downloaded differs from expected count"
            );
        }
    }
    if !report.is_success() {
        anyhow::bail!("No files were downloaded");
    }
    tracing::info!("Files updated successfully");
    Ok(())
}

/// Format a fatal error as the final line of the stdout report
fn fail_line(e: &anyhow::Error) -> String {
    format!("✗ Error: {e:#}")
}
