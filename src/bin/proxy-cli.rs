use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use serde_json::Value;

use stats_proxy::config::load_config;

#[derive(Parser)]
#[command(name = "stats-proxy-cli")]
#[command(about = "Smoke-test client for the stats proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// User-Agent to present; the proxy rejects scripted-looking ones
    #[arg(
        long,
        default_value = "Mozilla/5.0 (X11; Linux x86_64) stats-proxy-cli"
    )]
    user_agent: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request a fresh anti-bot token
    Token,
    /// Fetch an endpoint through the proxy, with a token
    Get {
        /// Upstream endpoint, e.g. "/players?search=curry"
        endpoint: String,

        /// Optional X-UID to send
        #[arg(long)]
        uid: Option<String>,
    },
    /// Parse and validate a config file without starting the proxy
    CheckConfig { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_str(&cli.user_agent)?);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    let client = reqwest::Client::builder().default_headers(headers).build()?;
    let proxy_url = format!("{}/api/proxy", cli.url.trim_end_matches('/'));

    match cli.command {
        Commands::Token => {
            let res = client.get(&proxy_url).query(&[("init", "1")]).send().await?;
            print_response(res).await?;
        }
        Commands::Get { endpoint, uid } => {
            let token = fetch_token(&client, &proxy_url).await?;
            let mut req = client
                .get(&proxy_url)
                .query(&[("endpoint", endpoint.as_str())])
                .header("x-ns-token", token);
            if let Some(uid) = uid {
                req = req.header("x-uid", uid);
            }
            print_response(req.send().await?).await?;
        }
        Commands::CheckConfig { path } => match load_config(&path) {
            Ok(config) => {
                println!("{} is valid", path.display());
                println!("{}", toml::to_string_pretty(&config)?);
            }
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

async fn fetch_token(
    client: &reqwest::Client,
    proxy_url: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    let res = client.get(proxy_url).query(&[("init", "1")]).send().await?;
    let status = res.status();
    let json: Value = res.json().await?;
    match json.get("token").and_then(Value::as_str) {
        Some(token) => Ok(token.to_string()),
        None => Err(format!("token request failed with status {status}: {json}").into()),
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if let Some(retry) = res.headers().get("retry-after").and_then(|v| v.to_str().ok()) {
        eprintln!("Retry-After: {retry}s");
    }
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: proxy returned status {status}");
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{text}"),
    }
    Ok(())
}
