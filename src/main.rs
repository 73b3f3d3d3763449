use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
#[allow(unused_imports)]
use log::{debug, info, warn, error};
use tokio_util::sync::CancellationToken;

use inference_explorer::annotation::animation::RESULT_FRAME_ID;
use inference_explorer::build_info::BuildInfo;
use inference_explorer::config::{Config, CONFIG};
use inference_explorer::logging;
use inference_explorer::page::ImageElement;
use inference_explorer::settings::ExplorerSettings;
use inference_explorer::transport::FilePart;
use inference_explorer::Explorer;

const APP_NAME: &str = "inference-explorer";

#[derive(Debug, Parser)]
#[command(name = "inference-explorer")]
#[command(about = "Explorer client for an AI inference server")]
#[command(version = BuildInfo::version())]
struct Cli {
    /// Settings file to use instead of the per-user one
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Server URL, overrides the settings file
    #[arg(long, global = true)]
    server: Option<String>,

    /// Processing call timeout in seconds, overrides the settings file
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Write the buffered log to debug.log before exiting
    #[arg(long, global = true)]
    export_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send images to a module and show the result
    Submit {
        /// Route of the module, e.g. "vision"
        route: String,
        /// Operation on the route, e.g. "detection"
        operation: String,
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        /// Extra form field as key=value
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
        /// Print the prediction summary instead of the raw response
        #[arg(long)]
        summary: bool,
        /// Write the bounding box overlay for the first image
        #[arg(long)]
        svg: Option<PathBuf>,
    },
    /// Poll the running modules and print the composed page
    Watch {
        #[arg(long, default_value_t = 1)]
        cycles: u32,
        /// Keep polling in the background for this many seconds instead of counting cycles
        #[arg(long)]
        for_secs: Option<u64>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Animate a rotating frame and write its last rendering
    Frame {
        #[arg(long, default_value_t = 640.0)]
        image_width: f64,
        #[arg(long, default_value_t = 480.0)]
        image_height: f64,
        /// Box as left,top,right,bottom in displayed pixels
        #[arg(long, value_delimiter = ',', num_args = 4, default_values_t = [100.0, 100.0, 300.0, 250.0])]
        bbox: Vec<f64>,
        #[arg(long, default_value_t = 2000)]
        duration_ms: u64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the effective settings, or write them to the settings file
    Settings {
        #[arg(long)]
        save: bool,
    },
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Expected key=value, got '{}'", raw)),
    }
}

fn load_settings(cli: &Cli) -> ExplorerSettings {
    let mut settings = match &cli.settings {
        Some(path) => ExplorerSettings::load(path.to_str()),
        None => ExplorerSettings::load(None),
    };
    if let Some(server) = &cli.server {
        settings.server_url = server.clone();
    }
    if let Some(timeout) = cli.timeout {
        settings.request_timeout_secs = timeout;
    }
    settings
}

fn effective_config(cli: &Cli) -> Config {
    if cli.settings.is_none() && cli.server.is_none() && cli.timeout.is_none() {
        return CONFIG.clone();
    }
    Config::from_settings(&load_settings(cli))
}

fn write_output(out: Option<&Path>, contents: &str) -> Result<(), String> {
    match out {
        Some(path) => {
            std::fs::write(path, contents).map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
            info!("Wrote {}", path.display());
        }
        None => println!("{}", contents),
    }
    Ok(())
}

async fn run_submit(
    config: Config,
    route: &str,
    operation: &str,
    images: &[PathBuf],
    fields: Vec<(String, String)>,
    summary: bool,
    svg: Option<&Path>,
) -> Result<(), String> {
    let explorer = Explorer::new(config)?;

    let mut files = Vec::with_capacity(images.len());
    for path in images {
        files.push(FilePart::from_path(path).await?);
    }

    // The first image stands in for the preview, at its natural size
    if let Some(first) = images.first() {
        let (width, height) = image::image_dimensions(first)
            .map_err(|e| format!("Failed to read image size of {}: {}", first.display(), e))?;
        let (width, height) = (width as f64, height as f64);
        explorer.page().lock().unwrap().preview_image =
            Some(ImageElement::new(&first.to_string_lossy(), width, height, width, height));
    }

    let outcome = explorer.process_image(route, operation, files, fields).await;
    info!("Average round trip: {:.1} ms", explorer.transport().average_round_trip_ms());

    let page = explorer.page().lock().unwrap();
    if let Some(status) = page.status() {
        eprintln!("{}", status.text);
    }

    match outcome {
        Ok(data) => {
            if summary {
                println!("{}", page.results_html());
            } else {
                let json = serde_json::to_string_pretty(&data).map_err(|e| e.to_string())?;
                println!("{}", json);
            }
            if let Some(path) = svg {
                if !page.mask.visible {
                    return Err("No bounding boxes to write".to_string());
                }
                write_output(Some(path), &page.mask.markup)?;
            }
            Ok(())
        }
        Err(e) => {
            println!("{}", page.results_html());
            Err(e.to_string())
        }
    }
}

async fn run_watch(config: Config, cycles: u32, for_secs: Option<u64>, out: Option<&Path>) -> Result<(), String> {
    let poll_interval = config.poll_interval;
    let explorer = Explorer::new(config)?;

    if let Some(secs) = for_secs {
        let cancel = CancellationToken::new();
        let poller = explorer.start_polling(cancel.clone());
        tokio::time::sleep(Duration::from_secs(secs)).await;
        cancel.cancel();
        if let Err(e) = poller.await {
            warn!("Polling task failed: {}", e);
        }
        return write_output(out, &explorer.snapshot_html());
    }

    for cycle in 0..cycles {
        if cycle > 0 {
            tokio::time::sleep(poll_interval).await;
        }
        let outcome = explorer.registry().poll_once().await;
        debug!("Poll {}: {:?}", cycle + 1, outcome);
    }

    write_output(out, &explorer.snapshot_html())
}

async fn run_frame(config: Config, image_width: f64, image_height: f64, bbox: &[f64], duration: Duration, out: Option<&Path>) -> Result<(), String> {
    let bbox: [f64; 4] = bbox.try_into().map_err(|_| "Expected four bbox values".to_string())?;
    let explorer = Explorer::new(config)?;
    explorer.page().lock().unwrap().result_image =
        Some(ImageElement::new("", image_width, image_height, image_width, image_height));

    let handle = explorer.draw_rotating_box("", bbox)?;
    tokio::time::sleep(duration).await;
    let fraction = handle.fraction();

    let markup = explorer.page().lock().unwrap()
        .overlay(RESULT_FRAME_ID)
        .map(|o| o.markup.clone())
        .unwrap_or_default();
    handle.detach().await;

    info!("Frame stopped at rotation {:.3}", fraction);
    write_output(out, &markup)
}

fn run_settings(cli: &Cli, save: bool) -> Result<(), String> {
    let settings = load_settings(cli);
    if save {
        let custom = cli.settings.as_deref().and_then(|p| p.to_str());
        let path = settings.save(custom)?;
        println!("Saved settings to {}", path.display());
    } else {
        print!("{}", settings.to_yaml_with_comments());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let cli = Cli::parse();

    let shared_log_buffer = logging::setup_logger(APP_NAME);
    logging::setup_panic_hook(APP_NAME, shared_log_buffer.clone());
    info!("Inference Explorer {}", BuildInfo::display_version());
    debug!("{}", BuildInfo::detailed_info());

    let config = effective_config(&cli);

    let result = match &cli.command {
        Command::Submit { route, operation, images, fields, summary, svg } => {
            run_submit(config, route, operation, images, fields.clone(), *summary, svg.as_deref()).await
        }
        Command::Watch { cycles, for_secs, out } => run_watch(config, *cycles, *for_secs, out.as_deref()).await,
        Command::Frame { image_width, image_height, bbox, duration_ms, out } => {
            run_frame(config, *image_width, *image_height, bbox, Duration::from_millis(*duration_ms), out.as_deref()).await
        }
        Command::Settings { save } => run_settings(&cli, *save),
    };

    if let Err(e) = &result {
        error!("{}", e);
    }

    if cli.export_logs {
        match logging::export_debug_logs(APP_NAME, &shared_log_buffer) {
            Ok(path) => eprintln!("Debug log written to {}", path.display()),
            Err(e) => eprintln!("Failed to export debug log: {}", e),
        }
    }

    result
}
