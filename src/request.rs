use crate::catalog::SuffixEntry;
use serde::{Deserialize, Serialize};

/// Seed value that asks for a random seed.
pub const RANDOM_SEED: i64 = -1;

/// Generation parameters for a single txt2img request.
///
/// Mirrors the A1111/Forge processing object. Jobs never mutate a shared
/// base; each one works on its own structural copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub styles: Vec<String>,
    pub seed: i64,
    pub subseed: i64,
    pub subseed_strength: f32,
    pub seed_resize_from_h: i64,
    pub seed_resize_from_w: i64,
    pub sampler_name: Option<String>,
    pub sampler_index: Option<u32>,
    pub batch_size: u32,
    pub n_iter: u32,
    pub steps: u32,
    pub cfg_scale: f32,
    pub width: u32,
    pub height: u32,
    pub restore_faces: bool,
    pub tiling: bool,
    pub do_not_save_samples: bool,
    pub do_not_save_grid: bool,
    pub sd_model: Option<String>,
    pub outpath_samples: Option<String>,
    pub outpath_grids: Option<String>,
    pub prompt_for_display: Option<String>,
    /// Label of the job this request was derived for.
    pub name: Option<String>,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            styles: Vec::new(),
            seed: RANDOM_SEED,
            subseed: RANDOM_SEED,
            subseed_strength: 0.0,
            seed_resize_from_h: -1,
            seed_resize_from_w: -1,
            sampler_name: None,
            sampler_index: None,
            batch_size: 1,
            n_iter: 1,
            steps: 20,
            cfg_scale: 7.0,
            width: 512,
            height: 512,
            restore_faces: false,
            tiling: false,
            do_not_save_samples: false,
            do_not_save_grid: false,
            sd_model: None,
            outpath_samples: None,
            outpath_grids: None,
            prompt_for_display: None,
            name: None,
        }
    }
}

impl GenerationRequest {
    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

/// Per-job field overrides applied on top of the base request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_iter: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
}

/// One derived generation: the expanded prompt plus the label it saves under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub prompt: String,
    pub label: String,
    #[serde(default)]
    pub overrides: JobOverrides,
}

impl Job {
    /// Iteration count this job runs, falling back to the base request.
    pub fn iterations(&self, base: &GenerationRequest) -> u32 {
        self.overrides.n_iter.unwrap_or(base.n_iter)
    }

    /// Structural copy of `base` with this job's prompt, name and overrides.
    pub fn derive_request(&self, base: &GenerationRequest) -> GenerationRequest {
        let mut request = base.clone();
        request.prompt.clone_from(&self.prompt);
        request.name = Some(self.label.clone());
        if let Some(n_iter) = self.overrides.n_iter {
            request.n_iter = n_iter;
        }
        if let Some(batch_size) = self.overrides.batch_size {
            request.batch_size = batch_size;
        }
        if let Some(negative_prompt) = self.overrides.negative_prompt.as_ref() {
            request.negative_prompt.clone_from(negative_prompt);
        }
        request
    }
}

/// Expands the base prompt into one job per enabled entry, in entry order.
pub fn build_jobs(base: &GenerationRequest, entries: &[SuffixEntry]) -> Vec<Job> {
    entries
        .iter()
        .filter(|entry| entry.enabled)
        .map(|entry| Job {
            prompt: format!("{} {}", base.prompt, entry.suffix),
            label: entry.label.clone(),
            overrides: JobOverrides::default(),
        })
        .collect()
}

/// Total iterations across `jobs`, used as the run's progress denominator.
pub fn total_iterations(base: &GenerationRequest, jobs: &[Job]) -> u32 {
    jobs.iter().map(|job| job.iterations(base)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SuffixCatalog;

    #[test]
    fn test_build_jobs_keeps_enabled_entries_in_order() {
        let mut catalog = SuffixCatalog::standard();
        catalog.select_none();
        catalog.set_enabled("surprise", true).unwrap();
        catalog.set_enabled("anger", true).unwrap();
        catalog.set_enabled("joy", true).unwrap();

        let base = GenerationRequest::with_prompt("1girl");
        let labels: Vec<_> = build_jobs(&base, catalog.entries())
            .into_iter()
            .map(|job| job.label)
            .collect();
        assert_eq!(labels, vec!["anger", "joy", "surprise"]);
    }

    #[test]
    fn test_build_jobs_uses_current_suffix_text() {
        let mut catalog = SuffixCatalog::standard();
        catalog.retain_only(&["anger", "confusion"]).unwrap();
        catalog.set_suffix("anger", "furious, clenched teeth").unwrap();

        let base = GenerationRequest::with_prompt("1girl, solo");
        let jobs = build_jobs(&base, catalog.entries());
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].prompt, "1girl, solo furious, clenched teeth");
        assert_eq!(jobs[1].prompt, "1girl, solo confused");
    }

    #[test]
    fn test_build_jobs_with_nothing_enabled_is_empty() {
        let mut catalog = SuffixCatalog::standard();
        catalog.select_none();
        let base = GenerationRequest::with_prompt("1girl");
        assert!(build_jobs(&base, catalog.entries()).is_empty());
    }

    #[test]
    fn test_empty_suffix_still_yields_job() {
        let entries = vec![SuffixEntry::new("blank", "")];
        let base = GenerationRequest::with_prompt("portrait");
        let jobs = build_jobs(&base, &entries);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].prompt, "portrait ");
    }

    #[test]
    fn test_derive_request_leaves_base_untouched() {
        let base = GenerationRequest {
            n_iter: 2,
            ..GenerationRequest::with_prompt("1girl")
        };
        let job = Job {
            prompt: "1girl sad".to_string(),
            label: "sadness".to_string(),
            overrides: JobOverrides {
                n_iter: Some(3),
                ..Default::default()
            },
        };

        let derived = job.derive_request(&base);
        assert_eq!(derived.prompt, "1girl sad");
        assert_eq!(derived.name.as_deref(), Some("sadness"));
        assert_eq!(derived.n_iter, 3);
        assert_eq!(base.prompt, "1girl");
        assert_eq!(base.name, None);
    }

    #[test]
    fn test_total_iterations_respects_overrides() {
        let base = GenerationRequest {
            n_iter: 2,
            ..Default::default()
        };
        let mut jobs = build_jobs(
            &base,
            &[SuffixEntry::new("a", "x"), SuffixEntry::new("b", "y")],
        );
        jobs[1].overrides.n_iter = Some(5);
        assert_eq!(total_iterations(&base, &jobs), 7);
    }
}
