//! Secure Pairing demo
//!
//! Pairs an in-process central and peripheral over a memory link. The
//! peripheral prints its PIN, the operator types it at the central's prompt,
//! and one message is then exchanged in each direction.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, bail};
use pairing_transport::MemoryLink;
use secure_pairing::{
    NoPin, PairingConfig, PairingDriver, Pin, PinError, PinSource, Role, SessionBuilder,
};
use tracing::info;
use zeroize::Zeroizing;

const USAGE: &str = "usage: pairing-cli [--config <file.json>] [--pin-digits <n>] \
                     [--handshake-timeout <secs>] [--pin-timeout <secs>]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pairing_cli=info".parse()?)
                .add_directive("secure_pairing=info".parse()?),
        )
        .init();

    let config = parse_args()?;
    info!("Starting pairing demo: {:?}", config);

    let (central_link, peripheral_link) = MemoryLink::pair();

    let peripheral = SessionBuilder::new(Role::Peripheral)
        .config(config.clone())
        .build()?;
    let central = SessionBuilder::new(Role::Central).config(config).build()?;

    let peripheral_task = tokio::spawn(
        PairingDriver::new(peripheral, peripheral_link, NoPin)
            .on_pin(|pin| println!("Device PIN: {}", pin.as_str()))
            .run(),
    );

    let mut app = PairingDriver::new(central, central_link, StdinPinPrompt)
        .run()
        .await
        .context("app side failed to pair")?;
    let mut device = peripheral_task
        .await?
        .context("device side failed to pair")?;

    info!("Paired, session {}", app.session().id());

    app.send(b"hello from the app").await?;
    let received = device.recv().await?;
    println!("Device received: {}", String::from_utf8_lossy(&received));

    device.send(b"hello from the device").await?;
    let received = app.recv().await?;
    println!("App received: {}", String::from_utf8_lossy(&received));

    app.close();
    device.close();
    Ok(())
}

fn parse_args() -> anyhow::Result<PairingConfig> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut config_path: Option<PathBuf> = None;
    let mut pin_digits: Option<usize> = None;
    let mut handshake_timeout: Option<u64> = None;
    let mut pin_timeout: Option<u64> = None;

    let mut i = 0;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--config", Some(value)) => config_path = Some(PathBuf::from(value)),
            ("--pin-digits", Some(value)) => {
                pin_digits = Some(value.parse().context("--pin-digits expects a number")?)
            }
            ("--handshake-timeout", Some(value)) => {
                handshake_timeout =
                    Some(value.parse().context("--handshake-timeout expects seconds")?)
            }
            ("--pin-timeout", Some(value)) => {
                pin_timeout = Some(value.parse().context("--pin-timeout expects seconds")?)
            }
            ("-h" | "--help", _) => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            (other, _) => bail!("unexpected argument '{}'\n{}", other, USAGE),
        }
        i += 2;
    }

    let mut config = match config_path {
        Some(path) => PairingConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => PairingConfig::default(),
    };

    if let Some(digits) = pin_digits {
        config.pin_digits = digits;
    }
    if let Some(secs) = handshake_timeout {
        config.handshake_timeout_secs = secs;
    }
    if let Some(secs) = pin_timeout {
        config.pin_entry_timeout_secs = secs;
    }

    config.validate()?;
    Ok(config)
}

/// Reads the PIN from stdin on a blocking thread
struct StdinPinPrompt;

impl PinSource for StdinPinPrompt {
    async fn request_pin(&mut self) -> Result<Pin, PinError> {
        // Wiped on drop; Pin keeps its own copy
        let line = tokio::task::spawn_blocking(|| -> io::Result<Zeroizing<String>> {
            print!("Enter the PIN shown on the device: ");
            io::stdout().flush()?;
            let mut line = Zeroizing::new(String::with_capacity(64));
            io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await
        .map_err(|e| PinError::Prompt(e.to_string()))?
        .map_err(|e| PinError::Prompt(e.to_string()))?;

        parse_pin(&line)
    }
}

/// An empty line cancels the prompt
fn parse_pin(line: &Zeroizing<String>) -> Result<Pin, PinError> {
    let digits = line.trim();
    if digits.is_empty() {
        return Err(PinError::Cancelled);
    }
    Ok(Pin::new(digits)?)
}
