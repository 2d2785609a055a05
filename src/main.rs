use anyhow::{Context, Result};
use clap::Parser;
use gstreamer as gst;
use hailocam::pipeline::{DetectionPipeline, GstBackend, GstRuntime, ProbeStatus, StagePlan};
use hailocam::{models, AppConfig, FrameStats, HardwareVariant};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Level};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model name, see --list-models
    #[arg(long)]
    model: Option<String>,

    /// Use the Hailo-8L model set
    #[arg(long)]
    hailo8l: bool,

    /// MJPEG camera URL
    #[arg(long)]
    camera_url: Option<String>,

    /// Installation directory containing resources/
    #[arg(long)]
    install_dir: Option<PathBuf>,

    /// Video sink element factory
    #[arg(long)]
    sink: Option<String>,

    /// Print the models available for the selected hardware and exit
    #[arg(long)]
    list_models: bool,

    /// Print the pipeline as a gst-launch-1.0 description and exit
    #[arg(long)]
    print_pipeline: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_toml_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => AppConfig::default(),
        };

        if let Some(model) = self.model {
            config.model.name = model;
        }
        if self.hailo8l {
            config.model.hardware = HardwareVariant::Hailo8L;
        }
        if let Some(url) = self.camera_url {
            config.camera.location = url;
        }
        if let Some(dir) = self.install_dir {
            config.model.install_dir = Some(dir);
        }
        if let Some(sink) = self.sink {
            config.output.sink = sink;
        }

        config.validate()?;
        Ok(config)
    }
}

fn on_buffer(buffer: &gst::BufferRef, stats: &FrameStats) -> ProbeStatus {
    let frame = stats.record_frame();
    debug!(
        frame,
        pts = ?buffer.pts(),
        size = buffer.size(),
        "Buffer left hailofilter"
    );
    ProbeStatus::Ok
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let list_models = args.list_models;
    let print_pipeline = args.print_pipeline;
    let config = args.into_config()?;

    if list_models {
        for name in config.model.hardware.model_names() {
            println!("{}", name);
        }
        return Ok(());
    }

    if print_pipeline {
        let hef_path = models::hef_path(
            &config.model.name,
            config.model.hardware,
            &config.install_dir()?,
        )?;
        println!("{}", StagePlan::new(&config, &hef_path).launch_description());
        return Ok(());
    }

    let runtime = GstRuntime::init()?;
    let backend = Arc::new(GstBackend::new(&runtime));

    let quit = backend.quit_handle();
    ctrlc::set_handler(move || {
        info!("Interrupted, stopping pipeline");
        quit.quit();
    })
    .context("installing Ctrl-C handler")?;

    let stats = Arc::new(FrameStats::new(Duration::from_secs(
        config.output.stats_interval_secs,
    )));
    let pipeline = DetectionPipeline::new(backend, &config, on_buffer, stats.clone())?;

    info!("Streaming from {}", config.camera.location);
    pipeline.run()?;

    if let Some(err) = pipeline.take_runtime_error() {
        warn!("Pipeline stopped after error: {}", err);
    }
    info!("{}", stats.format_summary());
    Ok(())
}
