//! Command dispatch for the `cdfs` binary.
//!
//! Library calls report per-file failures inside their reports; this layer prints them
//! and turns any failure into a non-zero exit status.

use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::cli::{self, Commands};
use crate::config::{workers_from_opt_or_env, PackOptions, UnpackOptions};
use crate::extract::{list_archive, unpack_archive_with_progress, ArchiveListing};
use crate::logging;
use crate::pack::pack_archive_with_progress;
use crate::progress::{ProgressCallback, ProgressState};
use crate::verify::verify_archive;
use crate::workers::TaskFailure;

const PROGRESS_LINE_WIDTH: usize = 80;

/// Parses arguments, runs the command and returns the process exit status.
pub fn run_cli_app() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let command = cli::run()?;
    logging::init(command.debug());
    let start = Instant::now();

    let clean = match &command {
        Commands::Pack {
            input_dir,
            output_file,
            sector_size,
            cache_size,
            workers,
            progress,
            debug,
        } => {
            if !input_dir.is_dir() {
                return Err(format!("Input directory '{}' does not exist", input_dir.display()).into());
            }
            let opts = PackOptions::default()
                .with_sector_size(*sector_size)
                .with_cache_size_hint(*cache_size)
                .with_workers(workers_from_opt_or_env(*workers));
            let progress_cb = progress.then(|| create_cli_progress_callback("pack"));

            let report =
                pack_archive_with_progress(input_dir, output_file, &opts, progress_cb.as_deref())?;
            if *debug {
                println!("Time taken: {}", format_elapsed(start.elapsed()));
            }
            println!(
                "Packed {} files ({} bytes) into {} ({} bytes)",
                report.file_count - report.failures.len(),
                report.total_bytes,
                report.archive_path.display(),
                report.archive_size
            );
            print_failures("pack", &report.failures);
            report.is_clean()
        }
        Commands::Unpack {
            input_file,
            output_dir,
            workers,
            progress,
            debug,
        } => {
            let opts = UnpackOptions::default().with_workers(workers_from_opt_or_env(*workers));
            let progress_cb = progress.then(|| create_cli_progress_callback("unpack"));

            let report =
                unpack_archive_with_progress(input_file, output_dir, &opts, progress_cb.as_deref())?;
            if *debug {
                println!("Time taken: {}", format_elapsed(start.elapsed()));
            }
            println!(
                "Unpacked {} files into {}",
                report.file_count - report.failures.len(),
                report.output_dir.display()
            );
            print_failures("unpack", &report.failures);
            report.is_clean()
        }
        Commands::List { input_file, json } => {
            let listing = list_archive(input_file)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                print_listing(input_file, &listing);
            }
            true
        }
        Commands::Verify { input_file } => {
            let summary = verify_archive(input_file)?;
            println!("Verification successful!");
            println!(
                "Archive contains {} files across {} sectors",
                summary.file_count, summary.total_sectors
            );
            true
        }
    };

    Ok(if clean { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn print_listing(path: &Path, listing: &ArchiveListing) {
    println!("Archive: {}", path.display());
    println!("CDFS Magic: {}", listing.magic);
    println!("CDFS Version: {}", listing.version);
    println!("File Count: {}", listing.file_count);
    println!("Sector Size: {} bytes", listing.sector_size);
    println!("Total Archive Size: {} bytes", listing.archive_size);
    println!("Total Sectors: {}", listing.total_sectors);
    println!("\nContents:");
    println!("{:<6} {:<12} Path", "Index", "Size");
    println!("{}", "-".repeat(PROGRESS_LINE_WIDTH));
    for entry in &listing.entries {
        println!("{:<6} {:<12} {}", entry.index, entry.length, entry.path);
    }
}

fn print_failures(operation: &str, failures: &[TaskFailure]) {
    if failures.is_empty() {
        return;
    }
    eprintln!("{} file(s) failed to {}:", failures.len(), operation);
    for failure in failures {
        eprintln!("  [{}] {}: {}", failure.index, failure.path.display(), failure.error);
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs >= 60.0 {
        format!("{}m {:.2}s", (secs / 60.0) as u64, secs % 60.0)
    } else {
        format!("{:.2}s", secs)
    }
}

// --- utils for CLI progress -------------------------------------------------

fn format_eta(state: &ProgressState) -> String {
    if state.speed_mbps <= 0.0 || state.progress_percent <= 0.0 {
        return "--".to_string();
    }
    let eta = state.estimated_time_remaining().as_secs_f32();
    if eta > 60.0 {
        format!("{:.1}m", eta / 60.0)
    } else {
        format!("{:.1}s", eta)
    }
}

fn status_line(operation: &str, state: &ProgressState, bar_width: usize) -> String {
    let filled = (((state.progress_percent / 100.0) * bar_width as f32) as usize).min(bar_width);
    let bar = format!("[{}{}]", "█".repeat(filled), "░".repeat(bar_width - filled));
    format!(
        "[{}] {} {:.1}% | {}/{} files | {:.1} MB/s | ETA: {}",
        operation.to_uppercase(),
        bar,
        state.progress_percent,
        state.processed_files,
        state.total_files,
        state.speed_mbps,
        format_eta(state)
    )
}

fn create_cli_progress_callback(operation: &str) -> Box<ProgressCallback> {
    let operation = operation.to_string();
    let last_update = Mutex::new(None::<Instant>);
    let prev_len = Mutex::new(0usize);
    let done = AtomicBool::new(false);

    Box::new(move |state: ProgressState| {
        if done.load(Ordering::Relaxed) {
            return;
        }
        let finished = state.processed_files >= state.total_files;
        // Redraw at most every 100ms, but always draw the final state.
        let should_update = finished || {
            let now = Instant::now();
            let mut last = last_update.lock().unwrap_or_else(|e| e.into_inner());
            match *last {
                Some(t) if now.duration_since(t) < Duration::from_millis(100) => false,
                _ => {
                    *last = Some(now);
                    true
                }
            }
        };
        if !should_update {
            return;
        }

        let mut bar_width = 40;
        let mut line = status_line(&operation, &state, bar_width);
        while line.chars().count() > PROGRESS_LINE_WIDTH && bar_width > 10 {
            bar_width -= 4;
            line = status_line(&operation, &state, bar_width);
        }

        {
            let mut prev = prev_len.lock().unwrap_or_else(|e| e.into_inner());
            let len = line.chars().count();
            if *prev > len {
                line.push_str(&" ".repeat(*prev - len));
            }
            *prev = len;
        }
        eprint!("\r\x1B[2K{}", line);
        io::stderr().flush().ok();

        if finished {
            eprintln!();
            done.store(true, Ordering::Relaxed);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(processed: u64, total: u64, percent: f32) -> ProgressState {
        ProgressState {
            total_files: total,
            processed_files: processed,
            failed_files: 0,
            total_bytes: 100,
            processed_bytes: percent as u64,
            elapsed_time: Duration::from_secs(1),
            speed_mbps: 0.0,
            progress_percent: percent,
        }
    }

    #[test]
    fn status_line_shows_counts_and_percent() {
        let line = status_line("pack", &state(1, 4, 25.0), 20);
        assert!(line.starts_with("[PACK] ["));
        assert!(line.contains("25.0%"));
        assert!(line.contains("1/4 files"));
        assert!(line.ends_with("ETA: --"));
    }

    #[test]
    fn bar_never_overflows() {
        let line = status_line("unpack", &state(4, 4, 130.0), 10);
        assert!(line.contains(&"█".repeat(10)));
        assert!(!line.contains('░'));
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_elapsed(Duration::from_secs(75)), "1m 15.00s");
    }
}
