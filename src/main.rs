use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use driftsync::cli::Cli;
use driftsync::driver;
use driftsync::log::{ConsoleSink, Sink};
use driftsync::settings::Settings;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red());
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings_path = Settings::default_path();
    let settings = Settings::load(&settings_path)?;

    let config = match cli.into_config(&settings) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {e}", "Error:".red());
            return Ok(ExitCode::from(1));
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("{} {e}", "Error:".red());
        return Ok(ExitCode::from(1));
    }

    let sink: Arc<dyn Sink> = Arc::new(ConsoleSink::new(config.verbose));

    let start = Instant::now();
    let summary = driver::run(&config, sink);
    let elapsed = start.elapsed();

    print_summary(&summary, elapsed, config.dry_run);

    let mut new_settings = settings;
    new_settings.hash_mode = config.hash_mode;
    new_settings.max_copy_workers = config.max_copy_workers;
    new_settings.mirror = config.mirror;
    let _ = new_settings.save(&settings_path);

    if !summary.errors.is_empty() {
        Ok(ExitCode::from(2))
    } else {
        Ok(ExitCode::from(0))
    }
}

fn print_summary(summary: &driver::Summary, elapsed: std::time::Duration, dry_run: bool) {
    let prefix = if dry_run { "(dry run) " } else { "" };
    println!(
        "{prefix}{} dirs created, {} copied, {} moved, {} dirs moved, {} deleted in {:.2}s",
        summary.created_dirs,
        summary.copied_files,
        summary.moved_files,
        summary.moved_dirs,
        summary.deleted,
        elapsed.as_secs_f64(),
    );

    if !summary.errors.is_empty() {
        println!("{}", format!("{} error(s):", summary.errors.len()).red());
        for err in &summary.errors {
            println!("  {} {err}", "[X] ERROR:".red().bold());
        }
    } else {
        println!("{}", "Done".green());
    }
}
