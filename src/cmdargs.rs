//! `--flag value` mini-language for generation parameters.
//!
//! Accepts the same flag names as the A1111 processing object, e.g.
//! `--steps 20 --prompt a cute cat --seed 5`. `--prompt` and
//! `--negative_prompt` swallow every token up to the next flag.

use crate::error::{ExpressionError, Result};
use crate::request::GenerationRequest;
use std::str::FromStr;

/// Parsed flags; fields are `None` when the flag was not given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandLineArgs {
    pub sd_model: Option<String>,
    pub outpath_samples: Option<String>,
    pub outpath_grids: Option<String>,
    pub prompt_for_display: Option<String>,
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub styles: Option<String>,
    pub seed: Option<i64>,
    pub subseed_strength: Option<f32>,
    pub subseed: Option<i64>,
    pub seed_resize_from_h: Option<i64>,
    pub seed_resize_from_w: Option<i64>,
    pub sampler_index: Option<u32>,
    pub sampler_name: Option<String>,
    pub batch_size: Option<u32>,
    pub n_iter: Option<u32>,
    pub steps: Option<u32>,
    pub cfg_scale: Option<f32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub restore_faces: Option<bool>,
    pub tiling: Option<bool>,
    pub do_not_save_samples: Option<bool>,
    pub do_not_save_grid: Option<bool>,
}

impl CommandLineArgs {
    /// Writes every given flag onto `request`.
    pub fn apply_to(&self, request: &mut GenerationRequest) {
        if let Some(value) = &self.sd_model {
            request.sd_model = Some(value.clone());
        }
        if let Some(value) = &self.outpath_samples {
            request.outpath_samples = Some(value.clone());
        }
        if let Some(value) = &self.outpath_grids {
            request.outpath_grids = Some(value.clone());
        }
        if let Some(value) = &self.prompt_for_display {
            request.prompt_for_display = Some(value.clone());
        }
        if let Some(value) = &self.prompt {
            request.prompt.clone_from(value);
        }
        if let Some(value) = &self.negative_prompt {
            request.negative_prompt.clone_from(value);
        }
        if let Some(value) = &self.styles {
            request.styles = value
                .split(',')
                .map(str::trim)
                .filter(|style| !style.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if let Some(value) = self.seed {
            request.seed = value;
        }
        if let Some(value) = self.subseed_strength {
            request.subseed_strength = value;
        }
        if let Some(value) = self.subseed {
            request.subseed = value;
        }
        if let Some(value) = self.seed_resize_from_h {
            request.seed_resize_from_h = value;
        }
        if let Some(value) = self.seed_resize_from_w {
            request.seed_resize_from_w = value;
        }
        if let Some(value) = self.sampler_index {
            request.sampler_index = Some(value);
        }
        if let Some(value) = &self.sampler_name {
            request.sampler_name = Some(value.clone());
        }
        if let Some(value) = self.batch_size {
            request.batch_size = value;
        }
        if let Some(value) = self.n_iter {
            request.n_iter = value;
        }
        if let Some(value) = self.steps {
            request.steps = value;
        }
        if let Some(value) = self.cfg_scale {
            request.cfg_scale = value;
        }
        if let Some(value) = self.width {
            request.width = value;
        }
        if let Some(value) = self.height {
            request.height = value;
        }
        if let Some(value) = self.restore_faces {
            request.restore_faces = value;
        }
        if let Some(value) = self.tiling {
            request.tiling = value;
        }
        if let Some(value) = self.do_not_save_samples {
            request.do_not_save_samples = value;
        }
        if let Some(value) = self.do_not_save_grid {
            request.do_not_save_grid = value;
        }
    }

    /// Default request with every given flag applied.
    pub fn to_request(&self) -> GenerationRequest {
        let mut request = GenerationRequest::default();
        self.apply_to(&mut request);
        request
    }
}

/// Parses a flag line, passing `--sampler_name` values through unchanged.
pub fn parse_command_line(line: &str) -> Result<CommandLineArgs> {
    parse_with_samplers(line, None)
}

/// Parses a flag line, resolving `--sampler_name` case-insensitively against
/// `samplers`. Names that match nothing resolve to no sampler.
pub fn parse_command_line_with_samplers(
    line: &str,
    samplers: &[String],
) -> Result<CommandLineArgs> {
    parse_with_samplers(line, Some(samplers))
}

fn parse_with_samplers(line: &str, samplers: Option<&[String]>) -> Result<CommandLineArgs> {
    let tokens = split_shell_words(line)?;
    let mut args = CommandLineArgs::default();
    let mut pos = 0usize;

    while pos < tokens.len() {
        let arg = tokens[pos].as_str();
        let Some(tag) = arg.strip_prefix("--") else {
            return Err(ExpressionError::config(format!(
                "must start with \"--\": {}",
                arg
            )));
        };
        if pos + 1 >= tokens.len() {
            return Err(ExpressionError::config(format!(
                "missing argument for command line option {}",
                arg
            )));
        }

        if tag == "prompt" || tag == "negative_prompt" {
            pos += 1;
            let mut text = tokens[pos].clone();
            pos += 1;
            while pos < tokens.len() && !tokens[pos].starts_with("--") {
                text.push(' ');
                text.push_str(&tokens[pos]);
                pos += 1;
            }
            if tag == "prompt" {
                args.prompt = Some(text);
            } else {
                args.negative_prompt = Some(text);
            }
            continue;
        }

        let value = tokens[pos + 1].as_str();
        match tag {
            "sd_model" => args.sd_model = Some(value.to_string()),
            "outpath_samples" => args.outpath_samples = Some(value.to_string()),
            "outpath_grids" => args.outpath_grids = Some(value.to_string()),
            "prompt_for_display" => args.prompt_for_display = Some(value.to_string()),
            "styles" => args.styles = Some(value.to_string()),
            "seed" => args.seed = Some(parse_value(arg, value)?),
            "subseed_strength" => args.subseed_strength = Some(parse_value(arg, value)?),
            "subseed" => args.subseed = Some(parse_value(arg, value)?),
            "seed_resize_from_h" => args.seed_resize_from_h = Some(parse_value(arg, value)?),
            "seed_resize_from_w" => args.seed_resize_from_w = Some(parse_value(arg, value)?),
            "sampler_index" => args.sampler_index = Some(parse_value(arg, value)?),
            "sampler_name" => args.sampler_name = resolve_sampler(value, samplers),
            "batch_size" => args.batch_size = Some(parse_value(arg, value)?),
            "n_iter" => args.n_iter = Some(parse_value(arg, value)?),
            "steps" => args.steps = Some(parse_value(arg, value)?),
            "cfg_scale" => args.cfg_scale = Some(parse_value(arg, value)?),
            "width" => args.width = Some(parse_value(arg, value)?),
            "height" => args.height = Some(parse_value(arg, value)?),
            "restore_faces" => args.restore_faces = Some(parse_bool(value)),
            "tiling" => args.tiling = Some(parse_bool(value)),
            "do_not_save_samples" => args.do_not_save_samples = Some(parse_bool(value)),
            "do_not_save_grid" => args.do_not_save_grid = Some(parse_bool(value)),
            _ => {
                return Err(ExpressionError::config(format!(
                    "unknown commandline option: {}",
                    arg
                )));
            }
        }

        pos += 2;
    }

    Ok(args)
}

fn parse_value<T: FromStr>(flag: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ExpressionError::config(format!("Invalid value for {}: {}", flag, raw)))
}

fn parse_bool(raw: &str) -> bool {
    raw == "true"
}

fn resolve_sampler(raw: &str, samplers: Option<&[String]>) -> Option<String> {
    let Some(samplers) = samplers else {
        return Some(raw.to_string());
    };
    let wanted = raw.to_lowercase();
    let resolved = samplers
        .iter()
        .find(|name| name.to_lowercase() == wanted)
        .cloned();
    if resolved.is_none() {
        log::warn!("Sampler '{}' is not offered by the server; ignoring it", raw);
    }
    resolved
}

/// POSIX-shell style word splitting: whitespace separates words, single
/// quotes are literal, double quotes honour backslash escapes.
pub fn split_shell_words(line: &str) -> Result<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Quote {
        None,
        Single,
        Double,
    }

    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote = Quote::None;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match quote {
            Quote::Single => {
                if ch == '\'' {
                    quote = Quote::None;
                } else {
                    current.push(ch);
                }
            }
            Quote::Double => match ch {
                '"' => quote = Quote::None,
                '\\' => match chars.peek() {
                    Some(&next @ ('"' | '\\' | '$' | '`')) => {
                        current.push(next);
                        chars.next();
                    }
                    _ => current.push('\\'),
                },
                _ => current.push(ch),
            },
            Quote::None => match ch {
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                '\'' => {
                    quote = Quote::Single;
                    in_word = true;
                }
                '"' => {
                    quote = Quote::Double;
                    in_word = true;
                }
                '\\' => {
                    in_word = true;
                    match chars.next() {
                        Some(next) => current.push(next),
                        None => return Err(ExpressionError::config("No escaped character")),
                    }
                }
                _ => {
                    in_word = true;
                    current.push(ch);
                }
            },
        }
    }

    if quote != Quote::None {
        return Err(ExpressionError::config("No closing quotation"));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}
