use std::io;
use std::time::Duration;

use script::{Bindings, CapabilitySet, Sandbox, SandboxConfig};

const DEFAULT_TIMEOUT_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct CliConfig {
    script_path: Option<String>,
    bindings: Vec<(String, String)>,
    timeout_ms: Option<u64>,
    help: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so stdout carries only the result document.
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli_args(&args).map_err(io::Error::other)?;
    if cli.help {
        print_usage();
        return Ok(());
    }
    let Some(script_path) = cli.script_path.as_ref() else {
        print_usage();
        return Err(io::Error::other("missing script path").into());
    };

    let source = std::fs::read_to_string(script_path)?;
    let bindings = cli
        .bindings
        .iter()
        .fold(Bindings::new(), |bindings, (name, text)| {
            bindings.with_json_text(name.clone(), text.clone())
        });
    let timeout = Duration::from_millis(cli.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));

    let sandbox = Sandbox::new(SandboxConfig::default());
    let value = sandbox
        .evaluate(bindings, &source, &CapabilitySet::read_only(), timeout)
        .await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn parse_cli_args(args: &[String]) -> Result<CliConfig, String> {
    let mut cfg = CliConfig::default();
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "-h" | "--help" => {
                cfg.help = true;
                index += 1;
            }
            "--bind" => {
                let raw = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --bind".to_string())?;
                let (name, text) = raw
                    .split_once('=')
                    .ok_or_else(|| format!("invalid --bind value '{raw}', expected name=<json>"))?;
                cfg.bindings.push((name.to_string(), text.to_string()));
                index += 2;
            }
            "--timeout-ms" => {
                let raw = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --timeout-ms".to_string())?;
                let value = raw
                    .parse::<u64>()
                    .map_err(|_| format!("invalid --timeout-ms value '{raw}'"))?;
                cfg.timeout_ms = Some(value);
                index += 2;
            }
            flag if flag.starts_with('-') => {
                return Err(format!("unknown flag '{flag}'"));
            }
            path => {
                if cfg.script_path.is_some() {
                    return Err(format!("unexpected extra argument '{path}'"));
                }
                cfg.script_path = Some(path.to_string());
                index += 1;
            }
        }
    }
    Ok(cfg)
}

fn print_usage() {
    println!("Usage:");
    println!("  ms-script-run <script-file> [--bind name=<json>]... [--timeout-ms <n>]");
    println!("  ms-script-run --help");
}
