use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use depot_dl::ServerConfig;

fn print_usage() {
    eprintln!("Usage: depotd [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <PATH>   Configuration file");
    eprintln!("                    (default: {})", ServerConfig::default_path().display());
    eprintln!("  --host <HOST>     Override the configured bind address");
    eprintln!("  --port <PORT>     Override the configured port");
    eprintln!("  -h, --help        Show this help");
}

#[tokio::main]
async fn main() -> depot_dl::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config_path = ServerConfig::default_path();
    let mut host: Option<String> = None;
    let mut port: Option<u16> = None;

    let args: Vec<String> = env::args().skip(1).collect();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                return Ok(());
            }
            "--config" => {
                i += 1;
                match args.get(i) {
                    Some(value) => config_path = PathBuf::from(value),
                    None => {
                        eprintln!("Error: --config requires a value");
                        std::process::exit(2);
                    }
                }
            }
            "--host" => {
                i += 1;
                match args.get(i) {
                    Some(value) => host = Some(value.clone()),
                    None => {
                        eprintln!("Error: --host requires a value");
                        std::process::exit(2);
                    }
                }
            }
            "--port" => {
                i += 1;
                match args.get(i).and_then(|v| v.parse().ok()) {
                    Some(value) => port = Some(value),
                    None => {
                        eprintln!("Error: --port requires a port number");
                        std::process::exit(2);
                    }
                }
            }
            other => {
                eprintln!("Error: unknown option: {other}");
                print_usage();
                std::process::exit(2);
            }
        }
        i += 1;
    }

    let mut config = ServerConfig::load(&config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    depot_dl::server::run(Arc::new(config)).await
}
