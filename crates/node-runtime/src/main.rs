//! Ember node entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::EnvFilter;

use node_runtime::{exit_codes, Node, NodeConfig};

fn parse_args() -> Result<PathBuf, String> {
    let mut args = std::env::args().skip(1);
    let mut config_path = PathBuf::from("ember.toml");
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                config_path = args
                    .next()
                    .map(PathBuf::from)
                    .ok_or_else(|| "--config requires a path".to_string())?;
            }
            "--help" | "-h" => {
                return Err(format!(
                    "usage: {} [--config <path>]",
                    std::env::args().next().unwrap_or_default()
                ));
            }
            other => return Err(format!("unknown argument {other:?}")),
        }
    }
    Ok(config_path)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = match parse_args() {
        Ok(path) => path,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(exit_codes::INIT_FAILURE as u8);
        }
    };

    let config = match NodeConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, path = %config_path.display(), "configuration error");
            return ExitCode::from(exit_codes::INIT_FAILURE as u8);
        }
    };

    let code = Node::run(config).await;
    ExitCode::from(code as u8)
}
