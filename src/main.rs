use anyhow::{Context, Result};
use clap::Parser;
use dream_client::assets::AnimationOptions;
use dream_client::{Config, DreamService, GenerateOptions, Style};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "dream-client")]
#[command(about = "Generate images with the Dream text-to-image service")]
struct CliArgs {
    /// Text prompt (only the first 200 characters are sent).
    prompt: String,

    /// Rendering style identifier.
    #[arg(long, default_value_t = Style::default().0)]
    style: u32,

    /// Write every intermediate render as an animated GIF instead of the final image.
    #[arg(long)]
    gif: bool,

    /// Output file; defaults to dream.jpg or dream.gif.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Polling budget in seconds.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Seconds between status checks.
    #[arg(long, value_name = "SECS", value_parser = parse_interval)]
    interval: Option<u64>,

    /// Per-frame display time for --gif, in milliseconds.
    #[arg(long, value_name = "MS")]
    frame_ms: Option<u64>,
}

fn parse_interval(input: &str) -> std::result::Result<u64, String> {
    match input.parse::<u64>() {
        Ok(0) => Err("interval must be at least 1 second".to_string()),
        Ok(secs) => Ok(secs),
        Err(_) => Err(format!("Invalid interval '{}'", input)),
    }
}

impl CliArgs {
    fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            PathBuf::from(if self.gif { "dream.gif" } else { "dream.jpg" })
        })
    }

    fn apply_overrides(&self, config: &mut Config) {
        if let Some(secs) = self.timeout {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.interval {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(ms) = self.frame_ms {
            config.frame_duration = Duration::from_millis(ms);
        }
    }
}

/// First Ctrl-C cancels the running generation; a second one exits at once.
async fn watch_interrupts(cancellation: CancellationToken) {
    while tokio::signal::ctrl_c().await.is_ok() {
        if cancellation.is_cancelled() {
            warn!("Interrupted again, exiting");
            std::process::exit(130);
        }
        warn!("Interrupted, cancelling generation (press Ctrl-C again to exit)");
        cancellation.cancel();
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let mut config = Config::from_env().context("Failed to load configuration")?;
    args.apply_overrides(&mut config);

    let service = DreamService::new(&config)?;

    let cancellation = CancellationToken::new();
    tokio::spawn(watch_interrupts(cancellation.clone()));

    let options = GenerateOptions::from_config(&config).with_cancellation(cancellation);
    let style = Style(args.style);

    let bytes = if args.gif {
        let animation = AnimationOptions {
            frame_duration: config.frame_duration,
        };
        service
            .generate_animation(&args.prompt, style, &options, animation)
            .await?
    } else {
        service.generate_image(&args.prompt, style, &options).await?
    };

    let path = args.output_path();
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Saved {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dream_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();
    info!("Generating \"{}\" (style {})", args.prompt, args.style);

    match run(args).await {
        Ok(()) => {
            info!("Generation completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Generation failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
