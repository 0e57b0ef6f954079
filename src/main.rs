use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use transcript_proxy::classify::{classify, TranscriptBody};
use transcript_proxy::config::LogFormat;
use transcript_proxy::provider::YoutubeConnector;
use transcript_proxy::proxy::EgressIpProbe;
use transcript_proxy::{
    server, Cli, Commands, Config, CorrelationId, ProxyEndpointSelector, ServiceError,
    TranscriptFetcher, VideoId,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load()?;

    init_tracing(config.logging.format, cli.verbose);

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            server::serve(config).await?;
        }
        Commands::Fetch { video_id, json } => {
            fetch_one(&config, &video_id, json, cli.quiet).await?;
        }
        Commands::Probe { direct } => {
            let probe = EgressIpProbe::new(&config.probe);
            let ip = if direct {
                probe.probe(None).await
            } else {
                let credentials = config
                    .proxy_credentials()
                    .context("Proxy credentials not configured (set PROXY_USERNAME and PROXY_PASSWORD)")?;
                let route = ProxyEndpointSelector::new(&config.proxy).select_route(&credentials);
                println!("Route: {}", route.descriptor());
                probe.probe(Some(&route)).await
            };
            println!("Egress IP: {}", style(&ip).cyan());
            if !ip.is_known() {
                anyhow::bail!("Failed to get IP");
            }
        }
        Commands::Config { show, init, force } => {
            if init {
                let path = Config::config_path()?;
                if path.exists() && !force {
                    anyhow::bail!(
                        "Configuration already exists at {} (pass --force to overwrite)",
                        path.display()
                    );
                }
                let path = Config::default().save()?;
                println!("Configuration written to: {}", path.display());
            }
            if show || !init {
                config.display();
            }
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat, verbose: bool) {
    let default_filter = if verbose {
        "transcript_proxy=debug,tower_http=debug"
    } else {
        "transcript_proxy=info,tower_http=info"
    };

    let (json_layer, text_layer) = match format {
        LogFormat::Json => (
            Some(fmt::layer().json().with_current_span(true).with_writer(std::io::stderr)),
            None,
        ),
        LogFormat::Text => (None, Some(fmt::layer().with_writer(std::io::stderr))),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(json_layer)
        .with(text_layer)
        .init();
}

async fn fetch_one(config: &Config, raw_video_id: &str, json: bool, quiet: bool) -> Result<()> {
    // Reject malformed ids before credentials or the network come into play
    if let Err(e) = VideoId::parse(raw_video_id) {
        let outcome = classify(&ServiceError::from(e), Some(raw_video_id));
        anyhow::bail!("{}: {}", outcome.kind, outcome.message);
    }

    let credentials = config
        .proxy_credentials()
        .context("Proxy credentials not configured (set PROXY_USERNAME and PROXY_PASSWORD)")?;
    let route = ProxyEndpointSelector::new(&config.proxy).select_route(&credentials);

    let fetcher = TranscriptFetcher::new(
        Arc::new(YoutubeConnector::new(&config.transcript)),
        config.transcript.preferred_languages.clone(),
    );
    let correlation_id = CorrelationId::generate();

    let spinner = (!quiet).then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Fetching transcript for {} via {}", raw_video_id, route.descriptor()));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let result = fetcher.fetch(&correlation_id, raw_video_id, &route).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            let outcome = classify(&ServiceError::from(e), Some(raw_video_id));
            anyhow::bail!("{}: {}", outcome.kind, outcome.message);
        }
    };

    if json {
        let body = TranscriptBody::new(result, &correlation_id);
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        eprintln!(
            "{} {} ({})",
            style("✓").green(),
            result.title,
            style(&result.language_code).cyan()
        );
        println!("{}", result.text);
    }

    Ok(())
}
