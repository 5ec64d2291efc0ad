//! CLI mode for depot - command-line client for depot servers.

mod progress;

use std::env;
use std::path::PathBuf;

use crate::download::{ClientOptions, DepotClient};
use crate::error::Result;

use progress::{CliProgress, print_catalog, print_games};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";

fn print_usage() {
    eprintln!("Usage: depot [OPTIONS] <COMMAND>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  list                          List games on the server");
    eprintln!("  files <GAME_ID>               Show a game's file catalog");
    eprintln!("  download <GAME_ID> <DIR>      Download or resume into DIR");
    eprintln!("  stream <GAME_ID> <DIR> <PCT>  Percent-based stream resume into DIR");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --server <URL>      Server base URL (default: {DEFAULT_SERVER},");
    eprintln!("                      or the DEPOT_SERVER environment variable)");
    eprintln!("  --key <KEY>         Shared secret (or DEPOT_API_KEY)");
    eprintln!("  --no-verify         Skip checksum verification after each file");
    eprintln!("  -h, --help          Show this help");
}

struct CliArgs {
    server: String,
    key: Option<String>,
    verify: bool,
    command: Command,
}

enum Command {
    List,
    Files { game_id: String },
    Download { game_id: String, dir: PathBuf },
    Stream { game_id: String, dir: PathBuf, percent: f64 },
}

fn bail(message: &str) -> ! {
    eprintln!("Error: {message}");
    eprintln!();
    print_usage();
    std::process::exit(2);
}

#[allow(clippy::too_many_lines)]
fn parse_args(args: &[String]) -> CliArgs {
    let mut server = env::var("DEPOT_SERVER").unwrap_or_else(|_| DEFAULT_SERVER.to_string());
    let mut key = env::var("DEPOT_API_KEY").ok();
    let mut verify = true;
    let mut positional: Vec<&str> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--server" => {
                i += 1;
                match args.get(i) {
                    Some(value) => server = value.clone(),
                    None => bail("--server requires a value"),
                }
            }
            "--key" => {
                i += 1;
                match args.get(i) {
                    Some(value) => key = Some(value.clone()),
                    None => bail("--key requires a value"),
                }
            }
            "--no-verify" => verify = false,
            flag if flag.starts_with('-') => bail(&format!("unknown option: {flag}")),
            value => positional.push(value),
        }
        i += 1;
    }

    let command = match positional.as_slice() {
        ["list"] => Command::List,
        ["files", game_id] => Command::Files {
            game_id: (*game_id).to_string(),
        },
        ["download", game_id, dir] => Command::Download {
            game_id: (*game_id).to_string(),
            dir: PathBuf::from(dir),
        },
        ["stream", game_id, dir, percent] => {
            let Ok(percent) = percent.parse::<f64>() else {
                bail("PCT must be a number between 0 and 100");
            };
            Command::Stream {
                game_id: (*game_id).to_string(),
                dir: PathBuf::from(dir),
                percent,
            }
        }
        [] => bail("missing command"),
        _ => bail("unrecognized command"),
    };

    CliArgs {
        server,
        key,
        verify,
        command,
    }
}

/// Entry point for the `depot` binary.
///
/// # Errors
///
/// Returns any error from the underlying client operations.
pub async fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        return Ok(());
    }

    let cli = parse_args(&args);
    let options = ClientOptions {
        verify_checksums: cli.verify,
        ..ClientOptions::default()
    };
    let client = DepotClient::with_options(&cli.server, cli.key.as_deref(), options)?;

    match cli.command {
        Command::List => {
            let games = client.list_games().await?;
            print_games(&games);
        }
        Command::Files { game_id } => {
            let catalog = client.fetch_catalog(&game_id).await?;
            print_catalog(&catalog);
        }
        Command::Download { game_id, dir } => {
            let reporter = CliProgress::new();
            client.download_game(&game_id, &dir, &reporter).await?;
            reporter.flush_warnings();
        }
        Command::Stream { game_id, dir, percent } => {
            let reporter = CliProgress::new();
            client
                .download_stream(&game_id, &dir, percent, &reporter)
                .await?;
            reporter.flush_warnings();
        }
    }
    Ok(())
}
