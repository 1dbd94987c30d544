// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cropwerk — composite exam question images from rendered pages and detector
// boxes.
//
// Entry point. Initialises logging, parses the command line, and runs the
// requested subcommand.

mod commands;
mod manifest;
mod output;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use cropwerk_pool::AbortSignal;

use commands::{ExtractArgs, PreviewArgs, run_extract, run_preview};

#[derive(Debug, Parser)]
#[command(name = "cropwerk", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Composite every question in a manifest and write the images.
    Extract(ExtractArgs),
    /// Write the intermediate stages of a single box for inspection.
    Preview(PreviewArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!("Cropwerk starting");

    let outcome = match cli.command {
        Command::Extract(args) => {
            let abort = AbortSignal::new();
            let on_interrupt = abort.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received; finishing dispatched questions");
                    on_interrupt.abort();
                }
            });
            run_extract(&args, abort).await.map(|report| {
                println!(
                    "{} images, {} failed, {} dropped, {} not dispatched ({} ms) -> {}",
                    report.images.len(),
                    report.failures.len(),
                    report.dropped.len(),
                    report.not_dispatched,
                    (report.finished_at - report.started_at).num_milliseconds(),
                    args.out.display()
                );
            })
        }
        Command::Preview(args) => run_preview(&args).map(|written| {
            for path in written {
                println!("{}", path.display());
            }
        }),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "cropwerk failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
