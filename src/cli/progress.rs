//! Progress bar and listing output for the CLI.

use std::sync::Mutex;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::catalog::{GameCatalog, GameSummary};
use crate::download::TransferProgress;
use crate::format::human_bytes;

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

fn make_transfer_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} @ {bytes_per_sec} - {msg}",
        )
        .expect("progress template is valid")
        .progress_chars("━━╌"),
    );
    bar
}

/// Renders transfer callbacks as a single aggregate progress bar.
pub struct CliProgress {
    bar: ProgressBar,
    warnings: Mutex<Vec<String>>,
}

impl CliProgress {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bar: make_transfer_bar(),
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Prints any warnings collected during the transfer.
    pub fn flush_warnings(&self) {
        if let Ok(warnings) = self.warnings.lock() {
            for warning in warnings.iter() {
                eprintln!("{}", style(warning).yellow());
            }
        }
    }
}

impl Default for CliProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferProgress for CliProgress {
    fn on_progress(&self, bytes_done: u64, bytes_total: u64) {
        if self.bar.length() != Some(bytes_total) {
            self.bar.set_length(bytes_total);
        }
        self.bar.set_position(bytes_done);
    }

    fn on_status(&self, message: &str) {
        if let Some(rest) = message.strip_prefix("warning:") {
            if let Ok(mut warnings) = self.warnings.lock() {
                warnings.push(rest.trim().to_string());
            }
        } else {
            self.bar.set_message(message.to_string());
        }
    }

    fn on_finished(&self) {
        self.bar.finish_with_message("✓ transfer complete");
    }
}

/// Prints the server's game listing.
pub fn print_games(games: &[GameSummary]) {
    if games.is_empty() {
        println!("No games available.");
        return;
    }
    println!("{SEPARATOR}");
    for game in games {
        println!(
            "  {}  {} ({})",
            style(&game.id).cyan(),
            game.name,
            game.version
        );
        if let Some(description) = &game.description {
            println!("      {description}");
        }
    }
    println!("{SEPARATOR}");
    println!("  {} game(s)", games.len());
}

/// Prints a game's file catalog with sizes and the total.
pub fn print_catalog(catalog: &GameCatalog) {
    println!("{SEPARATOR}");
    println!("{} ({})", style(&catalog.game_name).cyan(), catalog.game_id);
    println!("{SEPARATOR}");
    for file in &catalog.files {
        println!("  {} ({})", file.path, human_bytes(file.size));
    }
    println!("{SEPARATOR}");
    println!(
        "  {} file(s), {} total",
        catalog.total_files,
        human_bytes(catalog.total_size)
    );
}
