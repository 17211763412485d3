use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yt_transcript_scraper::browser::{load_cookies, ChromeSession};
use yt_transcript_scraper::channel::fetch_channel_catalog;
use yt_transcript_scraper::cli::{Cli, Commands, OutputFormat};
use yt_transcript_scraper::config::Config;
use yt_transcript_scraper::output;
use yt_transcript_scraper::pipeline::{BatchPipeline, PipelineOptions};
use yt_transcript_scraper::store::{FailureRecord, JsonFileStore, VideoRecord};
use yt_transcript_scraper::transcript::{ReplayClient, TranscriptEngine};
use yt_transcript_scraper::utils::{extract_video_id, format_duration};
use yt_transcript_scraper::{ScraperError, YouTubeDataApi};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "yt_transcript_scraper=debug"
    } else {
        "yt_transcript_scraper=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Video {
            video_id,
            url,
            output,
            format,
        } => {
            let video_id = match (video_id, url) {
                (Some(id), _) => id,
                (None, Some(url)) => extract_video_id(&url)?,
                (None, None) => anyhow::bail!("Either a video ID or --url is required"),
            };
            run_video(&config, &video_id, output.as_deref(), format).await?;
        }
        Commands::Channel {
            channel_id,
            api_key,
            save_dir,
            retry_failed,
            checkpoint_every,
        } => {
            let api_key = api_key
                .or_else(|| config.api.api_key.clone())
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| {
                    ScraperError::Configuration(
                        "YouTube Data API key is required: pass --api-key or set YT_API_KEY".to_string(),
                    )
                })?;
            let save_dir = save_dir.unwrap_or_else(|| config.pipeline.transcript_dir.clone());
            let options = PipelineOptions {
                retry_failed,
                checkpoint_every: checkpoint_every
                    .map(|n| n as usize)
                    .unwrap_or(config.pipeline.checkpoint_every),
            };
            run_channel(&config, &channel_id, &api_key, save_dir, options, cli.quiet).await?;
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                let path = match &cli.config {
                    Some(path) => path.clone(),
                    None => Config::config_path()?,
                };
                println!("Configuration file: {}", path.display());
                println!("Run with --show to print the effective settings.");
            }
        }
    }

    Ok(())
}

/// Launch the browser session and wrap it in an engine
async fn open_engine(config: &Config) -> Result<TranscriptEngine<ChromeSession>> {
    let cookies = match &config.browser.cookies_file {
        Some(path) => load_cookies(path)?,
        None => Vec::new(),
    };
    let replay = ReplayClient::new(Duration::from_secs(config.http.request_timeout_secs))?;

    let session = ChromeSession::launch(&config.browser, &cookies)
        .await
        .context("Failed to launch browser")?;

    Ok(TranscriptEngine::new(session, config.interception, replay))
}

async fn close_engine(engine: TranscriptEngine<ChromeSession>) {
    if let Err(err) = engine.close().await {
        tracing::warn!("Failed to close browser session: {}", err);
    }
}

async fn run_video(
    config: &Config,
    video_id: &str,
    output_path: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let mut engine = open_engine(config).await?;

    tracing::info!("Starting transcript retrieval for video: {}", video_id);
    let outcome = engine.get_transcript(video_id).await;
    close_engine(engine).await;
    let result = outcome?;

    if !result.is_english {
        tracing::warn!("Transcript is not in English, Vid URL: {}", result.video_url);
    }

    match output_path {
        Some(path) => {
            output::save_to_file(&result, path, format).await?;
            println!("Transcript saved to: {}", path.display());
        }
        None => output::print_to_console(&result, format)?,
    }

    Ok(())
}

async fn run_channel(
    config: &Config,
    channel_id: &str,
    api_key: &str,
    save_dir: PathBuf,
    options: PipelineOptions,
    quiet: bool,
) -> Result<()> {
    let api = YouTubeDataApi::new(
        &config.api,
        api_key,
        Duration::from_secs(config.http.request_timeout_secs),
    )?;
    let catalog = fetch_channel_catalog(&api, channel_id)
        .await
        .with_context(|| format!("Failed to enumerate uploads of channel {}", channel_id))?;
    tracing::info!("Found {} videos for channel {}", catalog.len(), channel_id);

    let file_name = format!("{}.json", channel_id);
    let success_store: JsonFileStore<VideoRecord> = JsonFileStore::new(save_dir.join("raw").join(&file_name));
    let failure_store: JsonFileStore<FailureRecord> = JsonFileStore::new(save_dir.join("failed").join(&file_name));

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let progress = ProgressBar::new(catalog.len() as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?,
        );
        progress
    };

    let mut engine = open_engine(config).await?;
    let outcome = BatchPipeline::new(&success_store, &failure_store, options)
        .with_progress(progress)
        .run(&catalog, &mut engine)
        .await;
    close_engine(engine).await;
    let summary = outcome?;

    println!(
        "{} {} new transcripts scraped, {} failed to scrape, {} skipped in {}",
        style("Done:").green().bold(),
        style(summary.succeeded).green(),
        style(summary.failed).red(),
        summary.skipped,
        format_duration(summary.elapsed.as_secs_f64())
    );
    println!("Transcripts: {}", success_store.path().display());
    println!("Failures:    {}", failure_store.path().display());

    Ok(())
}
