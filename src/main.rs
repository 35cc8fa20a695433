use batch_nbconvert::tools::CommandTools;
use batch_nbconvert::vcs::GitCli;
use batch_nbconvert::{BatchReport, Pipeline};
use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::sync::Arc;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

fn setup_logging(cli: &Cli, config: &Config) -> Result<()> {
    let level = if cli.is_verbose() {
        "debug"
    } else {
        config.log_level.as_deref().unwrap_or("info")
    };

    let mut builder = env_logger::Builder::new();
    builder.parse_filters(level).parse_default_env();

    if let Some(log_file) = &config.log_file {
        if let Some(parent) = log_file.parent() {
            fs::create_dir_all(parent).context("Failed to create log directory")?;
        }
        let target = Box::new(
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)
                .context("Failed to open log file")?,
        );
        builder.target(env_logger::Target::Pipe(target));
    }

    builder.init();
    Ok(())
}

fn print_report(action: &str, report: &BatchReport) {
    println!(
        "{} {} notebooks",
        action.green().bold(),
        report.notebooks.len()
    );
    if let Some(stats) = &report.snapshot {
        println!(
            "  {} {} files, {} directories",
            "copied".cyan(),
            stats.files,
            stats.directories
        );
    }
    if let Some(revision) = &report.revision {
        println!("  {} {}", "revision".cyan(), revision);
    }
    if let Some(manifest) = &report.manifest {
        println!("  {} {}", "manifest".cyan(), manifest.display());
    }
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    let tools = Arc::new(CommandTools::new(config.tools.clone()));
    let vcs = Arc::new(GitCli::new(&config.vcs.program));
    let pipeline = Pipeline::new(tools, vcs).with_manifest_name(&config.manifest_name);
    let cell_timeout = |t: &Option<u64>| t.unwrap_or(config.tools.cell_timeout_secs);
    let format = |f: &Option<String>| f.clone().unwrap_or_else(|| config.output_format.clone());

    match &cli.command {
        Commands::StripCopy {
            src,
            dst,
            parallel,
            clobber,
        } => {
            let report = pipeline
                .strip_copy(src, dst, parallel.unwrap_or(config.parallel), *clobber)
                .await?;
            print_report("Stripped", &report);
        }
        Commands::StripInplace { dir, parallel } => {
            let report = pipeline
                .strip_inplace(dir, parallel.unwrap_or(config.parallel))
                .await?;
            print_report("Stripped", &report);
        }
        Commands::ExecCopy {
            src,
            dst,
            parallel,
            clobber,
            cell_timeout: timeout,
        } => {
            let report = pipeline
                .exec_copy(
                    src,
                    dst,
                    parallel.unwrap_or(config.parallel),
                    *clobber,
                    cell_timeout(timeout),
                )
                .await?;
            print_report("Executed", &report);
        }
        Commands::ExecFileInplace {
            path,
            cell_timeout: timeout,
        } => {
            pipeline.exec_file_inplace(path, cell_timeout(timeout)).await?;
            println!("{} {}", "Executed".green().bold(), path.display());
        }
        Commands::ExecFileCopy {
            path,
            destination,
            format: to,
        } => {
            pipeline.exec_file_copy(path, destination, &format(to)).await?;
            println!(
                "{} {} -> {}",
                "Rendered".green().bold(),
                path.display(),
                destination.display()
            );
        }
        Commands::ExecInto {
            notebook,
            dst,
            format: to,
        } => {
            let written = pipeline.exec_into(notebook, dst, &format(to)).await?;
            println!(
                "{} {} -> {}",
                "Rendered".green().bold(),
                notebook.display(),
                written.display()
            );
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(&cli, &config).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
