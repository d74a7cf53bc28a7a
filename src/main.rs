use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use filesrv::config::parse_byte_size;
use filesrv::{routes, AppState, Config, DynamicTheme, EmbeddedTheme, Theme};

#[derive(Parser, Debug)]
#[command(name = "filesrv")]
#[command(about = "Serve a directory over HTTP with listings and browser uploads")]
#[command(version)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "FILESRV_PORT", default_value = "6060")]
    port: u16,

    /// Address to bind to
    #[arg(short, long, env = "FILESRV_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Root directory to serve files from
    #[arg(short, long, env = "FILESRV_ROOT", default_value = ".")]
    root: PathBuf,

    /// Theme directory to load from disk, reloaded on every page
    #[arg(short, long, env = "FILESRV_THEME_PATH")]
    theme: Option<PathBuf>,

    /// Maximum combined size of one upload, e.g. 4GB or 512MiB
    #[arg(long, env = "FILESRV_MAX_UPLOAD_SIZE", value_parser = parse_byte_size)]
    max_upload_size: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, env = "FILESRV_VERBOSE")]
    verbose: bool,

    /// Config file path (optional)
    #[arg(short, long, env = "FILESRV_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "filesrv=debug,tower_http=debug"
    } else {
        "filesrv=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    // Command line wins over the config file
    if let Some(theme) = cli.theme {
        config.theme_path = Some(theme);
    }
    if let Some(size) = cli.max_upload_size {
        config.max_upload_size = size;
    }

    let root_dir = cli.root.canonicalize().unwrap_or_else(|_| cli.root.clone());

    if !root_dir.exists() {
        return Err(format!("Root directory does not exist: {}", root_dir.display()).into());
    }

    if !root_dir.is_dir() {
        return Err(format!("Root path is not a directory: {}", root_dir.display()).into());
    }

    let theme: Arc<dyn Theme> = match &config.theme_path {
        Some(path) => Arc::new(DynamicTheme::new(path)?),
        None => Arc::new(EmbeddedTheme::new()?),
    };

    info!("Serving files from: {}", root_dir.display());
    info!("Using theme: {}", theme.name());

    let state = AppState::with_config(root_dir, config, theme);

    let app = routes::app(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
