//! Pasarela WS-Security client binary.
//!
//! Run with: `pasarela-wsse --config config.yaml`
//!
//! Secures the configured operation's payload, posts it to the gateway,
//! and prints the extracted response field. With `--dump` the secured
//! envelope is printed instead of being sent.

use anyhow::{bail, Context, Result};
use clap::Parser;
use pasarela_wsse::{
    load_credential, HttpTransport, SecureEnvelopeProcessor, SecurityError, Transport,
};
use pasarela_wsse::config::ClientConfig;
use rand::rngs::OsRng;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// WS-Security client for the Pasarela SOAP gateway.
///
/// Applies the pinned message-security profile (UsernameToken, XML
/// signature, hybrid body encryption) to one operation call and
/// processes the secured response.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print the secured envelope instead of posting it
    #[arg(long)]
    dump: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting Pasarela WS-Security client v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", args.config.display());

    let config: ClientConfig = if args.config.exists() {
        let content =
            std::fs::read_to_string(&args.config).context("Failed to read config file")?;
        serde_yaml::from_str(&content).context("Failed to parse config file")?
    } else {
        info!("Config file not found, using defaults");
        ClientConfig::default()
    };

    let Some(paths) = config.credentials.as_ref() else {
        bail!(
            "No credential paths configured. Key material is never embedded; \
             point the `credentials` section at your PEM files."
        );
    };

    let credential = load_credential(paths, &config.username, &config.password)
        .context("Failed to load credentials")?;

    info!(
        endpoint = %config.endpoint,
        operation = %config.operation,
        "Credentials loaded"
    );

    let processor = SecureEnvelopeProcessor::new(config.profile.clone());
    let mut rng = OsRng;
    let request = processor
        .secure(&config.payload, &config.operation, &credential, &mut rng)
        .context("Failed to secure envelope")?;

    if args.dump {
        println!("{}", String::from_utf8_lossy(&request.body));
        return Ok(());
    }

    let transport = HttpTransport::new().context("Failed to build HTTP client")?;
    let (status, body) = transport
        .post_envelope(&config.endpoint, &request.body, &request.headers)
        .context("Failed to post envelope")?;

    info!(status, bytes = body.len(), "Response received");

    match processor.process_response(status, &body, &credential, &config.response_field) {
        Ok(value) => {
            info!(field = %config.response_field, "Response processed");
            println!("{}", value);
            Ok(())
        }
        Err(SecurityError::PeerStatus { status, body }) => {
            error!(status, body = %body, "Peer rejected the request");
            bail!("peer returned HTTP {}", status);
        }
        Err(e) => {
            error!(stage = e.stage().as_str(), "Response processing failed");
            Err(anyhow::Error::new(e).context("Failed to process response"))
        }
    }
}
