use std::path::PathBuf;

use anyhow::Context;

pub(crate) const DEFAULT_CONFIG_PATH: &str = "config/tint.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Direct peer connection with server-assisted signaling.
    P2p,
    /// Every frame goes through the relay server.
    Relay,
}

pub(crate) struct Args {
    pub config_path: PathBuf,
    pub mode: Mode,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub interval_ms: Option<u64>,
}

pub(crate) fn parse_args() -> anyhow::Result<Args> {
    let mut config_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    let mut mode = Mode::Relay;
    let mut width: Option<u32> = None;
    let mut height: Option<u32> = None;
    let mut interval_ms: Option<u64> = None;

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-V" | "--version" => {
                println!("tint-client {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "-h" | "--help" => {
                println!("tint-client - Tint video streaming client");
                println!();
                println!("USAGE:");
                println!("    tint-client [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!(
                    "    --config <PATH>              Config file [default: {DEFAULT_CONFIG_PATH}]"
                );
                println!("    --mode <MODE>                Streaming path: p2p or relay [default: relay]");
                println!("    --width <PIXELS>             Capture width override");
                println!("    --height <PIXELS>            Capture height override");
                println!("    --interval <MS>              Capture interval override in milliseconds");
                println!("    -V, --version                Print version and exit");
                println!("    -h, --help                   Print this help and exit");
                std::process::exit(0);
            }
            "--config" => {
                i += 1;
                config_path = PathBuf::from(args.get(i).context("Missing --config value")?);
            }
            "--mode" => {
                i += 1;
                mode = match args.get(i).context("Missing --mode value")?.as_str() {
                    "p2p" => Mode::P2p,
                    "relay" => Mode::Relay,
                    other => anyhow::bail!("Invalid --mode '{other}', expected p2p or relay"),
                };
            }
            "--width" => {
                i += 1;
                width = Some(
                    args.get(i)
                        .context("Missing --width value")?
                        .parse()
                        .context("Invalid --width value")?,
                );
            }
            "--height" => {
                i += 1;
                height = Some(
                    args.get(i)
                        .context("Missing --height value")?
                        .parse()
                        .context("Invalid --height value")?,
                );
            }
            "--interval" => {
                i += 1;
                interval_ms = Some(
                    args.get(i)
                        .context("Missing --interval value")?
                        .parse()
                        .context("Invalid --interval value")?,
                );
            }
            other => anyhow::bail!("Unknown argument: {other}"),
        }
        i += 1;
    }

    Ok(Args {
        config_path,
        mode,
        width,
        height,
        interval_ms,
    })
}
