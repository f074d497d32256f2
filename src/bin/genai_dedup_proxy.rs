//! genai-dedup-proxy — 合并重复请求的生成式 AI 代理
//!
//! Usage:
//!   genai-dedup-proxy [--config <path>] [--bind <addr>]
//!   genai-dedup-proxy check [--config <path>]     Validate configuration and exit

use anyhow::Context;
use genai_dedup_proxy::ProxyConfig;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("help" | "--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some("version" | "--version" | "-V") => {
            println!("genai-dedup-proxy {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let check_only = args.first().map(String::as_str) == Some("check");
    let config = load_config(&args)?;

    if check_only {
        println!("Configuration OK");
        println!("  upstream:     {}", config.upstream.base_url);
        println!("  bind:         {}", config.server.bind);
        println!("  publish mode: {:?}", config.cache.publish_mode);
        match config.cache.max_entries {
            Some(n) => println!("  max entries:  {n}"),
            None => println!("  max entries:  unbounded"),
        }
        return Ok(());
    }

    genai_dedup_proxy::serve(config)
        .await
        .context("proxy server failed")
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn load_config(args: &[String]) -> anyhow::Result<ProxyConfig> {
    let path = flag_value(args, "--config")
        .map(PathBuf::from)
        .or_else(|| std::env::var("GENAI_PROXY_CONFIG").ok().map(PathBuf::from));

    ProxyConfig::load(path.as_deref(), flag_value(args, "--bind")).with_context(|| match &path {
        Some(p) => format!("invalid configuration ({})", p.display()),
        None => "invalid configuration".to_string(),
    })
}

fn print_usage() {
    println!(
        r#"genai-dedup-proxy — coalescing proxy for a generative-AI API

USAGE:
    genai-dedup-proxy [check] [OPTIONS]

COMMANDS:
    check                       Validate configuration and exit

OPTIONS:
    --config <path>             YAML configuration file
    --bind <addr>               Listen address (overrides config)
    -h, --help                  Show this help message
    -V, --version               Show version information

ENVIRONMENT:
    OPENAI_API_KEY              Upstream bearer credential (required)
    GENAI_PROXY_CONFIG          YAML configuration file
    GENAI_PROXY_BASE_URL        Upstream base URL
    GENAI_PROXY_TIMEOUT_SECS    Upstream call timeout (default 300)
    GENAI_PROXY_MAX_INFLIGHT    Concurrent upstream calls (default 1)
    GENAI_PROXY_HTTP_PROXY      Outbound proxy URL
    GENAI_PROXY_BIND            Listen address (default 0.0.0.0:8080)
    GENAI_PROXY_CACHE_MAX_ENTRIES  Bound on cached requests (default unbounded)
    GENAI_PROXY_PUBLISH_MODE    relaxed | strict
    RUST_LOG                    Log filter (default info)"#
    );
}
