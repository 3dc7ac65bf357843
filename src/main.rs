use anyhow::{Context, Result};
use axum::http::{header, HeaderMap, HeaderValue};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use visitor_analytics::analytics::{geoip, RequestContext, VisitorContext};
use visitor_analytics::config::Config;

#[derive(Parser)]
#[command(name = "visitor-analytics")]
#[command(about = "Extract page-view analytics from a request and a beacon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the visitor facts of a single request and print them as JSON
    Inspect {
        /// Beacon payload (JSON)
        #[arg(long, default_value = "")]
        beacon: String,
        /// Remote address of the connection
        #[arg(long)]
        ip: Option<String>,
        /// Raw request URI
        #[arg(long, default_value = "/")]
        uri: String,
        /// Host header
        #[arg(long)]
        host: Option<String>,
        /// Referer header
        #[arg(long)]
        referrer: Option<String>,
        /// Cookie header, e.g. "_wva=_wva.abc123"
        #[arg(long)]
        cookie: Option<String>,
        /// Extra request header as "name: value", repeatable
        #[arg(long = "header", value_name = "NAME: VALUE")]
        headers: Vec<String>,
    },
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
    let name = header::HeaderName::try_from(name.trim())
        .with_context(|| format!("invalid header name '{}'", name))?;
    let value = HeaderValue::from_str(value.trim())
        .with_context(|| format!("invalid value for header '{}'", name))?;
    headers.append(name, value);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    info!("Loaded configuration");

    match cli.command {
        Commands::Inspect {
            beacon,
            ip,
            uri,
            host,
            referrer,
            cookie,
            headers: extra_headers,
        } => {
            let mut headers = HeaderMap::new();
            if let Some(host) = host {
                insert_header(&mut headers, config.visitor.headers.host.as_str(), &host)?;
            }
            if let Some(referrer) = referrer {
                insert_header(&mut headers, config.visitor.headers.referrer.as_str(), &referrer)?;
            }
            if let Some(cookie) = cookie {
                insert_header(&mut headers, header::COOKIE.as_str(), &cookie)?;
            }
            for raw in extra_headers {
                let (name, value) = raw
                    .split_once(':')
                    .with_context(|| format!("header '{}' must look like 'name: value'", raw))?;
                insert_header(&mut headers, name, value)?;
            }

            let mut request = RequestContext::new(headers).with_request_uri(uri);
            if let Some(ip) = ip {
                request = request.with_remote_addr(ip);
            }

            let provider = geoip::from_config(&config.geoip)?;
            let mut ctx = VisitorContext::with_provider(request, &beacon, &config.visitor, provider);

            let page_view = ctx.page_view().await?;
            println!("{}", serde_json::to_string_pretty(&page_view)?);

            if let Some(cookie) = ctx.cookie_to_set() {
                println!("Set-Cookie: {}", cookie);
            }
        }
    }

    Ok(())
}
