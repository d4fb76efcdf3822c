use claude_azure_proxy::config::config_search_paths;
use claude_azure_proxy::proxy::build_client;
use claude_azure_proxy::{build_router, logging, AppState, ProxyConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "claude-azure-proxy",
    about = "Serve the Anthropic Messages API on top of an Azure OpenAI deployment",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Azure OpenAI resource endpoint (overrides config and AZURE_OPENAI_ENDPOINT)
    #[arg(long)]
    endpoint: Option<String>,

    /// Log outbound requests, upstream bodies and stream lines
    #[arg(long)]
    debug: bool,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let log = logging::init(cli.debug);

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(endpoint) = cli.endpoint {
        config.azure.endpoint = Some(endpoint);
    }
    if cli.debug {
        config.debug = true;
    }

    log.set_debug(config.debug);

    // Validate config eagerly
    let endpoint = config.effective_endpoint()?.to_string();
    config.resolve_api_key()?;

    let client = build_client(&config)?;
    let port = config.port;
    let state = Arc::new(AppState::new(config, client));

    info!("claude-azure-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("  Endpoint:     {}", endpoint);
    info!("  API version:  {}", state.config.azure.api_version);
    info!("  Default:      {}", state.models.default_model());
    info!("  Models:       {} mapped", state.models.len());
    info!("  Port:         {}", port);
    if state.config.debug {
        info!("  Debug:        on");
    }
    if state.models.is_empty() {
        warn!(
            "No model mappings configured, every request goes to {}",
            state.models.default_model()
        );
    }

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  ANTHROPIC_BASE_URL=http://localhost:{} claude", port);

    axum::serve(listener, app).await?;

    Ok(())
}
