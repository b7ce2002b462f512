//! Sequential run driver: one pipeline submission per job, every image saved
//! under the job label in a fresh timestamped directory.

use crate::error::{ExpressionError, Result};
use crate::pipeline::{ImagePipeline, ProgressReporter, RunProgress};
use crate::request::{total_iterations, GenerationRequest, Job, RANDOM_SEED};
use image::DynamicImage;
use rand::Rng;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_ROOT: &str = "outputs/expressions_packs";
const OUTPUT_DIR_PREFIX: &str = "expressions_";
/// Random seeds are drawn from `[0, SEED_UPPER_BOUND)`.
pub const SEED_UPPER_BOUND: i64 = 4_294_967_294;

/// Combined output of every job in a run.
///
/// `images`, `all_prompts`, `infotexts` and `saved_paths` are parallel and in
/// generation order.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub images: Vec<DynamicImage>,
    pub seed: i64,
    pub all_prompts: Vec<String>,
    pub infotexts: Vec<String>,
    pub output_dir: PathBuf,
    pub saved_paths: Vec<PathBuf>,
}

/// Runs every job against `pipeline` and collects the results.
///
/// `base` is only read; each job gets a derived copy. Pipeline errors abort
/// the run and are returned unchanged.
pub async fn run_all<P, R>(
    pipeline: &P,
    progress: &R,
    base: &GenerationRequest,
    jobs: &[Job],
    output_root: &Path,
) -> Result<RunResult>
where
    P: ImagePipeline + ?Sized,
    R: ProgressReporter + ?Sized,
{
    let mut shared = base.clone();
    shared.seed = resolve_seed(base.seed);
    shared.do_not_save_grid = true;

    let iterations_total = total_iterations(&shared, jobs);
    progress.run_started(jobs.len(), iterations_total);

    let output_dir = create_output_dir(output_root)?;
    log::info!(
        "Saving {} expressions (seed {}) to {}",
        jobs.len(),
        shared.seed,
        output_dir.display()
    );

    let mut result = RunResult {
        images: Vec::new(),
        seed: shared.seed,
        all_prompts: Vec::new(),
        infotexts: Vec::new(),
        output_dir,
        saved_paths: Vec::new(),
    };
    let mut names = FileNamer::default();

    for (index, job) in jobs.iter().enumerate() {
        let request = job.derive_request(&shared);
        progress.job_started(&RunProgress {
            job_no: index + 1,
            job_count: jobs.len(),
            label: job.label.clone(),
            iterations_total,
        });

        let processed = pipeline
            .process_images(&request)
            .await
            .map_err(ExpressionError::Pipeline)?;

        for image in processed.images {
            let path = result.output_dir.join(names.next_png(&job.label));
            image
                .save_with_format(&path, image::ImageFormat::Png)
                .map_err(|source| ExpressionError::Image {
                    path: path.clone(),
                    source,
                })?;
            result.saved_paths.push(path);
            result.images.push(image);
        }

        result.all_prompts.extend(processed.all_prompts);
        result.infotexts.extend(processed.infotexts);
    }

    log::info!(
        "Generated {} images across {} expressions in {}",
        result.images.len(),
        jobs.len(),
        result.output_dir.display()
    );

    Ok(result)
}

/// Fixes one concrete seed for the whole run when `seed` asks for a random one.
pub fn resolve_seed(seed: i64) -> i64 {
    if seed == RANDOM_SEED {
        rand::rng().random_range(0..SEED_UPPER_BOUND)
    } else {
        seed
    }
}

/// `<root>/expressions_<YYYYMMDD-HHMMSS>`, created if missing.
pub fn create_output_dir(output_root: &Path) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let output_dir = output_root.join(format!("{}{}", OUTPUT_DIR_PREFIX, stamp));

    std::fs::create_dir_all(&output_dir).map_err(|source| ExpressionError::Filesystem {
        path: output_dir.clone(),
        source,
    })?;

    Ok(output_dir)
}

/// Hands out unique `.png` names within one run: the first image for a
/// label is `<label>.png`, later ones (or labels that sanitize to the same
/// stem) get `_2`, `_3`, ...
#[derive(Debug, Default)]
struct FileNamer {
    used: HashSet<String>,
}

impl FileNamer {
    fn next_png(&mut self, label: &str) -> String {
        let stem = sanitize_stem(label);
        let mut counter = 1usize;
        loop {
            let candidate = if counter == 1 {
                format!("{}.png", stem)
            } else {
                format!("{}_{}.png", stem, counter)
            };
            // Case-insensitive so names stay distinct on Windows/macOS volumes.
            if self.used.insert(candidate.to_lowercase()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Keeps letters and digits in any script; drops path separators and
/// characters reserved on common filesystems.
fn sanitize_stem(value: &str) -> String {
    let mut sanitized = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
            sanitized.push(ch);
        } else if ch.is_whitespace() {
            sanitized.push('_');
        } else if ch.is_control()
            || matches!(ch, '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*')
        {
            continue;
        } else {
            sanitized.push(ch);
        }
    }
    let trimmed = sanitized.trim_matches(|ch| ch == '_' || ch == '.');
    if trimmed.is_empty() {
        "image".to_string()
    } else {
        trimmed.to_string()
    }
}
