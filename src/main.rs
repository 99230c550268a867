mod chat;
mod config;
mod error;
mod llm;
mod relay;
mod server;
mod template;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info};

use crate::config::Config;
use crate::llm::{BedrockProvider, ModelInvoker};
use crate::template::TemplateLoader;

#[tokio::main]
async fn main() {
    // Load .env file (if present) before anything reads env vars
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    if args.iter().any(|a| a == "--default-config") {
        print!("{}", Config::default_config_contents());
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from);

    let config = match Config::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    info!(
        bind = %config.bind_addr(),
        model = %config.llm.model_id,
        "webgen-gateway starting"
    );

    let templates = TemplateLoader::from_config(&config);

    if args.iter().any(|a| a == "--check") {
        run_checks(&config, &templates).await;
        return;
    }

    // Process-wide provider handle; every request shares its connection pool.
    let provider = match BedrockProvider::new(&config) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            error!("failed to initialize model provider: {e}");
            std::process::exit(1);
        }
    };

    let invoker = ModelInvoker::from_config(&config, provider, templates);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let shutdown_rx = shutdown_tx.subscribe();

    let mut server = {
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = server::serve(&config, invoker, shutdown_rx).await {
                error!("server exited: {e}");
            }
        })
    };

    info!("webgen-gateway is running, press Ctrl+C to stop");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("failed to listen for ctrl+c: {e}");
            }
            info!("shutdown signal received, stopping...");
            let _ = shutdown_tx.send(());
            let _ = server.await;
        }
        _ = &mut server => {}
    }

    info!("webgen-gateway stopped");
}

/// Validate config, the template store and provider settings, then exit.
async fn run_checks(config: &Config, templates: &TemplateLoader) {
    info!("running pre-flight checks...");

    info!("config: OK");
    info!("  bind: {}", config.bind_addr());
    info!("  model_id: {}", config.llm.model_id);
    info!("  max_tokens: {}", config.llm.max_tokens);

    match templates.load().await {
        Ok(files) => info!(
            "template: OK ({} files from bucket \"{}\", prefix \"{}\")",
            files.len(),
            templates.bucket(),
            templates.prefix()
        ),
        Err(e) => error!("template: FAILED: {e}"),
    }

    match BedrockProvider::new(config) {
        Ok(_) => info!("model provider: OK"),
        Err(e) => error!("model provider: {e}"),
    }
}

fn print_usage() {
    println!(
        "webgen-gateway: prompt assembly and streaming relay for the web-app editor

USAGE:
    webgen-gateway [OPTIONS]

OPTIONS:
    --config <PATH>     Path to config file (default: ~/.config/webgen-gateway/config.toml)
    --default-config    Print default config to stdout and exit
    --check             Validate config, template store and provider settings, then exit
    -h, --help          Print this help message

ENDPOINTS:
    POST /chat            Unary chat, JSON reply
    POST /chat/stream     Streaming chat, plain-text body
    GET  /template        Base template files
    GET  /healthz         Liveness probe

ENVIRONMENT:
    GATEWAY_BIND               Listen address (default: 127.0.0.1:3040)
    AWS_BEARER_TOKEN_BEDROCK   Model API key (required)
    AWS_REGION                 Region for the default endpoint (default: us-east-1)
    BEDROCK_ENDPOINT           Explicit model runtime endpoint
    BEDROCK_MODEL_ID           Model identifier
    TEMPLATE_ROOT              Directory holding template buckets
    TEMPLATE_BUCKET            Template bucket name
    TEMPLATE_PREFIX            Template key prefix
    RUST_LOG                   Log filter (default: info)"
    );
}
