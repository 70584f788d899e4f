// Sortline command line interface
// Headless detection loop for the fish sorting line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sortline_eye::config::VisionConfig;
use sortline_eye::models::LabelList;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sortline")]
#[command(about = "Sortline - real-time fish identification for the sorting line", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detection loop until Ctrl-C
    Run {
        /// Configuration file (TOML or JSON)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Frame source: device index, video file or stream URI
        #[arg(long)]
        source: Option<String>,

        /// Classifier model file
        #[arg(long)]
        model: Option<PathBuf>,

        /// Class label file, one label per line
        #[arg(long)]
        labels: Option<PathBuf>,

        /// Minimum confidence for a sample to count toward stabilization
        #[arg(long)]
        threshold: Option<f32>,

        /// Stabilization window in seconds
        #[arg(long)]
        window: Option<f64>,

        /// Log level (error, warn, info, debug, trace)
        #[arg(long)]
        log_level: Option<String>,
    },

    /// Print the class index to label table
    Labels {
        #[arg(long)]
        labels: PathBuf,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Configuration file to merge over the defaults
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

/// Command line values that take precedence over file and environment.
#[derive(Default)]
struct Overrides {
    source: Option<String>,
    model: Option<PathBuf>,
    labels: Option<PathBuf>,
    threshold: Option<f32>,
    window: Option<f64>,
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            source,
            model,
            labels,
            threshold,
            window,
            log_level,
        } => {
            let overrides = Overrides {
                source,
                model,
                labels,
                threshold,
                window,
                log_level,
            };
            let config = load_config(config.as_deref(), overrides)?;
            init_logging(&config.log_level, cli.log_json);
            run(config)
        }
        Commands::Labels { labels } => {
            let list = LabelList::load(&labels)?;
            for (index, label) in list.iter().enumerate() {
                println!("{:>3}  {}", index, label);
            }
            Ok(())
        }
        Commands::Config { config } => {
            let config = load_config(config.as_deref(), Overrides::default())?;
            let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            print!("{}", rendered);
            Ok(())
        }
    }
}

/// Defaults, then the config file, then `SORTLINE_*` variables, then flags.
fn load_config(path: Option<&Path>, overrides: Overrides) -> Result<VisionConfig> {
    let mut config = match path {
        Some(path) => VisionConfig::from_file(path)?,
        None => VisionConfig::default(),
    };
    config.apply_env()?;

    if let Some(source) = overrides.source {
        config.source = source;
    }
    if let Some(model) = overrides.model {
        config.model.model_path = model;
    }
    if let Some(labels) = overrides.labels {
        config.model.labels_path = labels;
    }
    if let Some(threshold) = overrides.threshold {
        config.model.confidence_threshold = threshold;
    }
    if let Some(window) = overrides.window {
        config.stability.window_secs = window;
    }
    if let Some(level) = overrides.log_level {
        config.log_level = level;
    }

    config.validate()?;
    Ok(config)
}

fn init_logging(level: &str, json: bool) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(feature = "hardware")]
fn run(config: VisionConfig) -> Result<()> {
    use sortline_eye::camera::FrameSource;
    use sortline_eye::models::Classifier;
    use sortline_eye::processing::{DetectionPipeline, LogSink};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tracing::{info, warn};

    let classifier = Arc::new(Classifier::load(&config.model).context("Failed to load classifier")?);

    let mut source = FrameSource::with_opencv(&config.source, config.capture.clone())?;
    source
        .start()
        .with_context(|| format!("Failed to open frame source {}", config.source))?;

    let stop = Arc::new(AtomicBool::new(false));
    if let Err(err) = ctrlc::set_handler({
        let stop = Arc::clone(&stop);
        move || {
            stop.store(true, Ordering::Release);
        }
    }) {
        warn!("Failed to install Ctrl-C handler: {}", err);
    }

    let mut pipeline = DetectionPipeline::new(source.reader(), Arc::clone(&classifier), config.stability.window_secs)
        .with_config(config.pipeline.clone());
    pipeline.add_sink(Box::new(LogSink::new()));

    info!(
        "Watching {} (threshold {:.2}, window {:.2}s)",
        config.source,
        classifier.threshold(),
        config.stability.window_secs
    );
    let stats = pipeline.run(&stop);
    source.stop();

    let capture = source.stats();
    info!(
        "Shutdown: {} frames captured, {} capture failures, {} reconnects",
        capture.frames_captured, capture.capture_failures, capture.reconnects
    );
    info!(
        "Shutdown: {} classifications ({} on repeated frames), {} identifications, {} inference failures",
        stats.classified, stats.repeated_frames, stats.stable_events, stats.failures
    );
    Ok(())
}

#[cfg(not(feature = "hardware"))]
fn run(_config: VisionConfig) -> Result<()> {
    anyhow::bail!(
        "`sortline run` needs the OpenCV capture and ONNX Runtime backends; rebuild with `--features hardware`"
    )
}
