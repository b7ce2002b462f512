pub mod catalog;
pub mod cli;
pub mod cmdargs;
pub mod error;
pub mod forge_api;
pub mod pipeline;
pub mod request;
pub mod runner;
pub mod selection;

use catalog::SuffixCatalog;
use cli::{CliCommand, CliOptions, Settings};
use error::Result;
use forge_api::ForgePipeline;
use pipeline::LogProgress;
use runner::RunResult;
use std::process::ExitCode;

/// Entry point: parses arguments and drives one expression run against Forge.
pub fn run() -> ExitCode {
    env_logger::init();

    let command = match cli::parse_cli_args(std::env::args().skip(1), cli::Settings::from_env()) {
        Ok(command) => command,
        Err(error) => {
            eprintln!("{}", error);
            cli::usage();
            return ExitCode::FAILURE;
        }
    };

    let options = match command {
        CliCommand::Help => {
            cli::usage();
            return ExitCode::SUCCESS;
        }
        CliCommand::List => {
            print_catalog(&SuffixCatalog::standard());
            return ExitCode::SUCCESS;
        }
        CliCommand::Check(settings) => return check_connection(&settings),
        CliCommand::Run(options) => options,
    };

    let Some(runtime) = build_runtime() else {
        return ExitCode::FAILURE;
    };

    match runtime.block_on(execute(&options)) {
        Ok(result) => {
            println!(
                "Generated {} image{} with seed {} in {}",
                result.images.len(),
                if result.images.len() == 1 { "" } else { "s" },
                result.seed,
                result.output_dir.display()
            );
            ExitCode::SUCCESS
        }
        Err(error) => {
            log::error!("Expression run failed: {}", error);
            eprintln!("{}", error);
            ExitCode::FAILURE
        }
    }
}

fn build_runtime() -> Option<tokio::runtime::Runtime> {
    match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => Some(runtime),
        Err(error) => {
            eprintln!("Failed to start async runtime: {}", error);
            None
        }
    }
}

fn check_connection(settings: &Settings) -> ExitCode {
    let Some(runtime) = build_runtime() else {
        return ExitCode::FAILURE;
    };

    let api_key = settings.api_key.as_deref();
    match runtime.block_on(forge_api::test_connection(&settings.base_url, api_key)) {
        Ok(status) if status.ok => {
            println!("{}", status.message);
            ExitCode::SUCCESS
        }
        Ok(status) => {
            eprintln!("{}", status.message);
            ExitCode::FAILURE
        }
        Err(error) => {
            log::error!("Forge connection check failed: {}", error);
            eprintln!("Connection failed at {}: {}", settings.base_url, error);
            ExitCode::FAILURE
        }
    }
}

async fn execute(options: &CliOptions) -> Result<RunResult> {
    let catalog = options.build_catalog()?;
    if let Some(path) = &options.save_preset {
        selection::write_preset(path, &selection::SelectionPreset::from_catalog(&catalog))?;
        log::info!("Saved selection preset to {}", path.display());
    }

    let settings = &options.settings;
    let api_key = settings.api_key.as_deref();
    let samplers = match forge_api::list_samplers(&settings.base_url, api_key).await {
        Ok(samplers) => Some(samplers),
        Err(error) => {
            log::warn!("Sampler list unavailable: {}", error);
            None
        }
    };

    let args = match samplers.as_deref() {
        Some(samplers) => cmdargs::parse_command_line_with_samplers(&options.params, samplers)?,
        None => cmdargs::parse_command_line(&options.params)?,
    };
    let base = args.to_request();
    if base.prompt.trim().is_empty() {
        log::warn!("No --prompt given; jobs will use the suffixes alone");
    }

    let jobs = request::build_jobs(&base, catalog.entries());
    let pipeline = ForgePipeline::new(settings.base_url.clone(), settings.api_key.clone())
        .with_samplers(samplers.unwrap_or_default());

    runner::run_all(&pipeline, &LogProgress, &base, &jobs, &settings.output_root).await
}

fn print_catalog(catalog: &SuffixCatalog) {
    println!("{} ({} images)", catalog.name(), catalog.len());
    for entry in catalog.entries() {
        println!("  {:<15} {}", entry.label, entry.suffix);
    }
}
