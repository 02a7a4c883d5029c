#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use viewer_shell::encode::decode_base64;
use viewer_shell::{
    Bridge, ContentPage, DeliveryOutcome, Encoding, LaunchSource, OpenedFile, Orchestrator,
    ShellConfig, SurfaceSlot,
};

/// Time the in-process page takes to define its bridge.
const PAGE_INIT_DELAY: Duration = Duration::from_millis(250);

// ============================================================================
// CLI Configuration
// ============================================================================

enum Command {
    Serve,
    Open {
        files: Vec<PathBuf>,
        out_dir: PathBuf,
        source: LaunchSource,
    },
}

struct CliConfig {
    config_path: PathBuf,
    command: Command,
}

fn print_usage() {
    eprintln!("Usage: viewer-shell [--config <PATH>] <COMMAND>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  serve                      Install the shell cache and serve it over HTTP");
    eprintln!("  open [OPTIONS] <file>...   Hand files to the viewer content");
    eprintln!();
    eprintln!("Open options:");
    eprintln!("  --out <DIR>                Where the viewer writes received files (default: .)");
    eprintln!("  --cold                     Treat files as a cold launch instead of an open event");
    eprintln!();
    eprintln!("Global options:");
    eprintln!("  --config <PATH>            Config file (created with defaults if missing)");
    eprintln!("  -h, --help                 Show this help");
    eprintln!();
    eprintln!("Recognized files: .html .htm (text), .stl .ply .obj (3D models)");
}

fn parse_args() -> CliConfig {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut config_path = ShellConfig::default_path();
    let mut command: Option<&str> = None;
    let mut files = Vec::new();
    let mut out_dir = PathBuf::from(".");
    let mut source = LaunchSource::OpenUrl;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            "--config" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    eprintln!("Error: --config requires a value");
                    std::process::exit(1);
                };
                config_path = PathBuf::from(value);
            }
            "--out" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    eprintln!("Error: --out requires a value");
                    std::process::exit(1);
                };
                out_dir = PathBuf::from(value);
            }
            "--cold" => source = LaunchSource::ColdLaunch,
            "serve" | "open" if command.is_none() => command = Some(args[i].as_str()),
            arg if arg.starts_with('-') => {
                eprintln!("Error: unknown option {arg}");
                std::process::exit(1);
            }
            file => files.push(PathBuf::from(file)),
        }
        i += 1;
    }

    let command = match command {
        Some("serve") => Command::Serve,
        Some("open") if !files.is_empty() => Command::Open {
            files,
            out_dir,
            source,
        },
        _ => {
            print_usage();
            std::process::exit(1);
        }
    };

    CliConfig {
        config_path,
        command,
    }
}

// ============================================================================
// Viewer Content
// ============================================================================

/// Listener standing in for the viewer: writes each received file to `out_dir`.
fn save_received(out_dir: &Path, file: &OpenedFile) -> Result<(), viewer_shell::ListenerError> {
    let bytes = match file.encoding {
        Encoding::Text => file.content.clone().into_bytes(),
        Encoding::Base64 => decode_base64(&file.content)?,
    };
    let name = Path::new(&file.file_name)
        .file_name()
        .ok_or("received file has no name")?;
    let target = out_dir.join(name);
    std::fs::write(&target, &bytes)?;
    log::info!("Viewer received {} ({} bytes) -> {}", file.file_name, bytes.len(), target.display());
    Ok(())
}

async fn open_files(
    config: &ShellConfig,
    files: Vec<PathBuf>,
    out_dir: PathBuf,
    source: LaunchSource,
) -> viewer_shell::Result<()> {
    std::fs::create_dir_all(&out_dir)?;

    let page = ContentPage::new(
        move |bridge: &Bridge| {
            let out_dir = out_dir.clone();
            bridge.register(move |file| save_received(&out_dir, file));
        },
        PAGE_INIT_DELAY,
    );
    page.load();

    let surface = SurfaceSlot::new();
    surface.attach(Arc::new(page));
    let orchestrator = Orchestrator::new(config.delivery.clone(), surface.clone());

    let mut failures = 0;
    for path in files {
        let Some(delivery) = orchestrator.open_file(&path, source) else {
            log::warn!("Skipping {}: not an HTML or 3D model file", path.display());
            continue;
        };
        let outcome = delivery
            .await
            .unwrap_or_else(|e| DeliveryOutcome::Failed(format!("delivery task failed: {e}")));
        match outcome.into_result() {
            Ok(attempts) => {
                log::info!("{}: delivered after {attempts} attempt(s)", path.display());
            }
            Err(e) => {
                log::error!("{}: {e}", path.display());
                failures += 1;
            }
        }
    }
    surface.detach();

    if failures > 0 {
        return Err(viewer_shell::Error::Undelivered(failures));
    }
    Ok(())
}

// ============================================================================
// Cache Front
// ============================================================================

#[cfg(feature = "server")]
async fn serve(config: &ShellConfig) -> viewer_shell::Result<()> {
    use viewer_shell::{CacheManager, CacheStorage, HttpFetcher};

    let fetcher = Arc::new(HttpFetcher::new(config.cache.origin.clone())?);
    let cache = Arc::new(CacheManager::new(
        config.cache.clone(),
        Arc::new(CacheStorage::new()),
        fetcher,
    ));

    let report = cache.start().await;
    log::info!(
        "Cache {} ready: {} cached, {} failed",
        cache.version(),
        report.cached,
        report.failed.len()
    );

    let server = viewer_shell::server::run_server(cache, &config.server);
    tokio::select! {
        result = server => result.map_err(|e| viewer_shell::Error::Server(e.to_string())),
        _ = tokio::signal::ctrl_c() => {
            log::info!("Received SIGINT");
            Ok(())
        }
    }
}

#[cfg(not(feature = "server"))]
async fn serve(_config: &ShellConfig) -> viewer_shell::Result<()> {
    eprintln!("Server support not compiled in");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> viewer_shell::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = parse_args();
    let config = ShellConfig::load_or_create(&cli.config_path)?;
    log::info!("Loaded config from {}", cli.config_path.display());

    match cli.command {
        Command::Serve => serve(&config).await,
        Command::Open {
            files,
            out_dir,
            source,
        } => open_files(&config, files, out_dir, source).await,
    }
}
