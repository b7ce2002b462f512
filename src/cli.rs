use crate::catalog::SuffixCatalog;
use crate::forge_api::DEFAULT_BASE_URL;
use crate::runner::DEFAULT_OUTPUT_ROOT;
use crate::selection;
use std::path::PathBuf;

pub const BASE_URL_ENV: &str = "FORGE_BASE_URL";
pub const API_KEY_ENV: &str = "FORGE_API_KEY";
pub const OUTPUT_ROOT_ENV: &str = "EXPRESSION_OUTPUT_ROOT";

/// Defaults taken from the environment before flags are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub output_root: PathBuf,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            base_url: non_empty(BASE_URL_ENV).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: non_empty(API_KEY_ENV),
            output_root: non_empty(OUTPUT_ROOT_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_ROOT)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Help,
    List,
    Check(Settings),
    Run(CliOptions),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOptions {
    pub params: String,
    pub settings: Settings,
    pub preset: Option<PathBuf>,
    pub save_preset: Option<PathBuf>,
    pub only: Option<Vec<String>>,
    pub select_all: bool,
    pub select_none: bool,
    pub suffix_edits: Vec<(String, String)>,
}

impl CliOptions {
    /// Standard catalog with the preset, then `--all`, `--none`, `--only` and
    /// `--suffix` applied in that order.
    pub fn build_catalog(&self) -> crate::error::Result<SuffixCatalog> {
        let mut catalog = match &self.preset {
            Some(path) => selection::load_catalog(path)?,
            None => SuffixCatalog::standard(),
        };
        if self.select_all {
            catalog.select_all();
        }
        if self.select_none {
            catalog.select_none();
        }
        if let Some(labels) = &self.only {
            catalog.retain_only(labels.as_slice())?;
        }
        for (label, suffix) in &self.suffix_edits {
            catalog.set_suffix(label, suffix.as_str())?;
        }
        Ok(catalog)
    }
}

pub fn usage() {
    println!("Generate one image per emotion suffix through a Forge/A1111 server.");
    println!();
    println!("Usage:");
    println!("  expression-pack --params \"--prompt 1girl, solo --steps 20\" [options]");
    println!();
    println!("Options:");
    println!("  --params LINE        generation flags (--prompt, --seed, --steps, ...)");
    println!("  --base-url URL       Forge API base URL [env {}]", BASE_URL_ENV);
    println!("  --api-key KEY        bearer token for the API [env {}]", API_KEY_ENV);
    println!(
        "  --output-root DIR    parent of the expressions_<timestamp> folder [env {}]",
        OUTPUT_ROOT_ENV
    );
    println!("  --preset FILE        load enabled flags and suffixes (.yaml/.yml/.json)");
    println!("  --save-preset FILE   write the final selection before running");
    println!("  --only a,b,...       enable only the listed expressions");
    println!("  --all                enable every expression (e.g. on top of a preset)");
    println!("  --none               start with every expression disabled");
    println!("  --suffix label=text  replace one expression's suffix (repeatable)");
    println!("  --list               print the expression catalog and exit");
    println!("  --check              test the connection to the Forge API and exit");
    println!("  --help, -h           show this help");
}

pub fn parse_cli_args<I>(args: I, settings: Settings) -> Result<CliCommand, String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut settings = settings;
    let mut params = None;
    let mut preset = None;
    let mut save_preset = None;
    let mut only = None;
    let mut select_all = false;
    let mut select_none = false;
    let mut check = false;
    let mut suffix_edits = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(CliCommand::Help),
            "--list" => return Ok(CliCommand::List),
            "--check" => check = true,
            "--all" => select_all = true,
            "--none" => select_none = true,
            "--params" => params = Some(next_value(&mut args, &arg)?),
            "--base-url" => settings.base_url = next_value(&mut args, &arg)?,
            "--api-key" => settings.api_key = Some(next_value(&mut args, &arg)?),
            "--output-root" => settings.output_root = PathBuf::from(next_value(&mut args, &arg)?),
            "--preset" => preset = Some(PathBuf::from(next_value(&mut args, &arg)?)),
            "--save-preset" => save_preset = Some(PathBuf::from(next_value(&mut args, &arg)?)),
            "--only" => {
                let value = next_value(&mut args, &arg)?;
                only = Some(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|label| !label.is_empty())
                        .map(ToString::to_string)
                        .collect(),
                );
            }
            "--suffix" => {
                let value = next_value(&mut args, &arg)?;
                let Some((label, suffix)) = value.split_once('=') else {
                    return Err(format!("Expected label=text after --suffix, got: {}", value));
                };
                suffix_edits.push((label.trim().to_string(), suffix.to_string()));
            }
            unknown => return Err(format!("Unknown argument: {}", unknown)),
        }
    }

    if check {
        return Ok(CliCommand::Check(settings));
    }

    let Some(params) = params else {
        return Err("Missing --params".to_string());
    };

    Ok(CliCommand::Run(CliOptions {
        params,
        settings,
        preset,
        save_preset,
        only,
        select_all,
        select_none,
        suffix_edits,
    }))
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    args.next()
        .ok_or_else(|| format!("Missing value after {}", flag))
}
