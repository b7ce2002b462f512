use crate::error::PipelineError;
use crate::pipeline::{ImagePipeline, Processed};
use crate::request::GenerationRequest;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use image::DynamicImage;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7860";

const SDAPI_PREFIX: &str = "/sdapi/v1";
const LIST_TIMEOUT_SECONDS: u64 = 60;
const SEND_TIMEOUT_SECONDS: u64 = 600;

/// Outcome of [`test_connection`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeStatus {
    pub ok: bool,
    pub message: String,
}

/// txt2img request body understood by Forge/A1111.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgePayload {
    pub prompt: String,
    pub negative_prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub styles: Vec<String>,
    pub seed: i64,
    pub subseed: i64,
    pub subseed_strength: f32,
    pub seed_resize_from_h: i64,
    pub seed_resize_from_w: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampler_name: Option<String>,
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
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_settings: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_images: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_images: Option<bool>,
}

impl ForgePayload {
    /// Builds a payload from a request. `samplers` resolves `sampler_index`
    /// when no sampler name is set.
    pub fn from_request(request: &GenerationRequest, samplers: &[String]) -> Self {
        let sampler_name = parse_optional_text(request.sampler_name.as_deref()).or_else(|| {
            request
                .sampler_index
                .and_then(|index| samplers.get(index as usize).cloned())
        });

        Self {
            prompt: request.prompt.clone(),
            negative_prompt: request.negative_prompt.clone(),
            styles: request.styles.clone(),
            seed: request.seed,
            subseed: request.subseed,
            subseed_strength: request.subseed_strength,
            seed_resize_from_h: request.seed_resize_from_h,
            seed_resize_from_w: request.seed_resize_from_w,
            sampler_name,
            batch_size: request.batch_size,
            n_iter: request.n_iter,
            steps: request.steps,
            cfg_scale: request.cfg_scale,
            width: request.width,
            height: request.height,
            restore_faces: request.restore_faces,
            tiling: request.tiling,
            do_not_save_samples: request.do_not_save_samples,
            do_not_save_grid: request.do_not_save_grid,
            override_settings: build_override_settings(request),
            send_images: Some(true),
            save_images: Some(!request.do_not_save_samples),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ForgeTxt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
    info: Option<String>,
}

/// Subset of the JSON document Forge returns in `info`.
#[derive(Debug, Clone, Default, Deserialize)]
struct ForgeInfo {
    #[serde(default)]
    all_prompts: Vec<String>,
    #[serde(default)]
    infotexts: Vec<String>,
}

/// [`ImagePipeline`] backed by a running Forge/A1111 server (`--api`).
#[derive(Debug, Clone)]
pub struct ForgePipeline {
    base_url: String,
    api_key: Option<String>,
    samplers: Vec<String>,
}

impl ForgePipeline {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            samplers: Vec::new(),
        }
    }

    /// Sampler names in server order, used to resolve `sampler_index`.
    pub fn with_samplers(mut self, samplers: Vec<String>) -> Self {
        self.samplers = samplers;
        self
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

#[async_trait]
impl ImagePipeline for ForgePipeline {
    async fn process_images(
        &self,
        request: &GenerationRequest,
    ) -> Result<Processed, PipelineError> {
        let payload = ForgePayload::from_request(request, &self.samplers);
        log::debug!(
            "txt2img payload for {}: {}",
            request.name.as_deref().unwrap_or("<unnamed>"),
            serde_json::to_string(&payload)?
        );
        let response = send_txt2img(&payload, &self.base_url, self.api_key()).await?;
        processed_from_response(request, response)
    }
}

/// Reachability check against the `samplers` endpoint. A non-success status
/// is reported in the returned status; only transport failures are errors.
pub async fn test_connection(
    base_url: &str,
    api_key: Option<&str>,
) -> Result<ForgeStatus, PipelineError> {
    let client = build_client(api_key, LIST_TIMEOUT_SECONDS)?;
    let endpoint = build_sdapi_endpoint(base_url, "samplers");

    let response = client.get(&endpoint).send().await?;
    Ok(connection_status(response.status(), &endpoint))
}

fn connection_status(status: StatusCode, endpoint: &str) -> ForgeStatus {
    if status.is_success() {
        ForgeStatus {
            ok: true,
            message: "Connected to Forge/A1111 API".to_string(),
        }
    } else {
        ForgeStatus {
            ok: false,
            message: format_status_error("Connection failed", status, endpoint),
        }
    }
}

pub async fn list_samplers(
    base_url: &str,
    api_key: Option<&str>,
) -> Result<Vec<String>, PipelineError> {
    list_named_options(base_url, api_key, "samplers").await
}

async fn send_txt2img(
    payload: &ForgePayload,
    base_url: &str,
    api_key: Option<&str>,
) -> Result<ForgeTxt2ImgResponse, PipelineError> {
    let client = build_client(api_key, SEND_TIMEOUT_SECONDS)?;
    let endpoint = build_sdapi_endpoint(base_url, "txt2img");

    let response = client
        .post(&endpoint)
        .json(payload)
        .send()
        .await
        .map_err(|error| std::io::Error::other(format_send_transport_error(&endpoint, &error)))?;

    if !response.status().is_success() {
        return Err(std::io::Error::other(format_status_error(
            "Forge request failed",
            response.status(),
            &endpoint,
        ))
        .into());
    }

    Ok(response.json().await?)
}

fn processed_from_response(
    request: &GenerationRequest,
    response: ForgeTxt2ImgResponse,
) -> Result<Processed, PipelineError> {
    let raw_info = response.info.unwrap_or_default();
    let info: ForgeInfo = serde_json::from_str(&raw_info).unwrap_or_default();

    let mut payloads = response.images;
    let described = info.all_prompts.len().max(info.infotexts.len());
    if described > 0 && payloads.len() > described {
        // Leading grid image; only individual samples are described in info.
        let extra = payloads.len() - described;
        payloads.drain(..extra);
    }

    let mut processed = Processed::default();
    for (index, payload) in payloads.iter().enumerate() {
        let image = match decode_forge_image_payload(payload) {
            Ok(image) => image,
            Err(error) => {
                log::warn!(
                    "Forge output decode failed for {} image {}: {}",
                    request.name.as_deref().unwrap_or("<unnamed>"),
                    index + 1,
                    error
                );
                continue;
            }
        };
        processed.images.push(image);
        processed.all_prompts.push(
            info.all_prompts
                .get(index)
                .cloned()
                .unwrap_or_else(|| request.prompt.clone()),
        );
        processed.infotexts.push(
            info.infotexts
                .get(index)
                .cloned()
                .unwrap_or_else(|| raw_info.clone()),
        );
    }

    if processed.images.is_empty() && !payloads.is_empty() {
        return Err(std::io::Error::other(
            "Forge returned image payloads, but none could be decoded",
        )
        .into());
    }

    Ok(processed)
}

fn decode_forge_image_payload(payload: &str) -> Result<DynamicImage, String> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err("empty image payload".to_string());
    }

    let b64_data = if let Some(rest) = trimmed.strip_prefix("data:") {
        let (_mime, b64) = rest
            .split_once(";base64,")
            .ok_or_else(|| "malformed data URI payload".to_string())?;
        b64
    } else {
        trimmed
    };

    let normalized_b64: String = b64_data.chars().filter(|ch| !ch.is_whitespace()).collect();
    let decoded = BASE64_STANDARD
        .decode(normalized_b64.as_bytes())
        .map_err(|error| format!("base64 decode failed: {}", error))?;
    if decoded.is_empty() {
        return Err("decoded payload is empty".to_string());
    }

    image::load_from_memory(&decoded).map_err(|error| format!("image decode failed: {}", error))
}

fn build_override_settings(request: &GenerationRequest) -> Option<Value> {
    let mut settings = Map::new();
    if let Some(model) = parse_optional_text(request.sd_model.as_deref()) {
        settings.insert("sd_model_checkpoint".to_string(), json!(model));
    }
    if let Some(dir) = parse_optional_text(request.outpath_samples.as_deref()) {
        settings.insert("outdir_txt2img_samples".to_string(), json!(dir));
    }
    if let Some(dir) = parse_optional_text(request.outpath_grids.as_deref()) {
        settings.insert("outdir_txt2img_grids".to_string(), json!(dir));
    }

    if settings.is_empty() {
        None
    } else {
        Some(Value::Object(settings))
    }
}

fn parse_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn collect_named_options(entries: &[Value]) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut options = Vec::new();

    for entry in entries {
        let name = entry
            .get("name")
            .and_then(|value| value.as_str())
            .or_else(|| entry.get("label").and_then(|value| value.as_str()))
            .or_else(|| entry.get("title").and_then(|value| value.as_str()));

        let Some(name) = name else {
            continue;
        };
        let trimmed = name.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            options.push(trimmed.to_string());
        }
    }

    options
}

async fn list_named_options(
    base_url: &str,
    api_key: Option<&str>,
    endpoint_name: &str,
) -> Result<Vec<String>, PipelineError> {
    let client = build_client(api_key, LIST_TIMEOUT_SECONDS)?;
    let endpoint = build_sdapi_endpoint(base_url, endpoint_name);
    let response = client.get(&endpoint).send().await?;

    if !response.status().is_success() {
        return Err(std::io::Error::other(format!(
            "Request failed for {} with status {}",
            endpoint,
            response.status()
        ))
        .into());
    }

    let raw: Vec<Value> = response.json().await?;
    Ok(collect_named_options(&raw))
}

fn build_sdapi_endpoint(base_url: &str, endpoint: &str) -> String {
    let normalized = normalize_base_url(base_url);
    let path = endpoint.trim_start_matches('/');
    format!("{normalized}{SDAPI_PREFIX}/{path}")
}

fn normalize_base_url(base_url: &str) -> String {
    let mut normalized = base_url.trim().trim_end_matches('/').to_string();
    if normalized.is_empty() {
        return normalized;
    }

    loop {
        let stripped = if let Some(value) = normalized.strip_suffix("/docs") {
            Some(value)
        } else if let Some(value) = normalized.strip_suffix(SDAPI_PREFIX) {
            Some(value)
        } else {
            normalized.strip_suffix("/sdapi")
        };

        let Some(value) = stripped else {
            return normalized;
        };

        normalized = value.trim_end_matches('/').to_string();
        if normalized.is_empty() {
            return normalized;
        }
    }
}

fn format_status_error(prefix: &str, status: StatusCode, endpoint: &str) -> String {
    if status == StatusCode::NOT_FOUND {
        format!(
            "{} with status {} at {}. Start Forge with --api and use a base URL like {} (without /sdapi/v1).",
            prefix, status, endpoint, DEFAULT_BASE_URL
        )
    } else {
        format!("{} with status {} at {}", prefix, status, endpoint)
    }
}

fn format_send_transport_error(endpoint: &str, error: &reqwest::Error) -> String {
    if error.is_timeout() {
        return format!(
            "Forge request timed out at {}. Model loading or generation exceeded {} seconds; reduce steps/resolution or try again after the model is warm.",
            endpoint, SEND_TIMEOUT_SECONDS
        );
    }

    if error.is_connect() {
        return format!(
            "Forge connection failed at {}. Verify Forge is still running and accepting API requests.",
            endpoint
        );
    }

    format!("Forge transport error at {}: {}", endpoint, error)
}

fn build_client(api_key: Option<&str>, timeout_seconds: u64) -> Result<reqwest::Client, PipelineError> {
    let mut headers = HeaderMap::new();

    if let Some(key) = api_key {
        let token = key.trim();
        if !token.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))?;
            headers.insert(AUTHORIZATION, value);
        }
    }

    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .default_headers(headers)
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_base64(color: [u8; 4]) -> String {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba(color)));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        BASE64_STANDARD.encode(bytes)
    }

    #[test]
    fn test_normalize_base_url_strips_sdapi_suffixes() {
        assert_eq!(
            normalize_base_url("http://127.0.0.1:7860/sdapi/v1"),
            "http://127.0.0.1:7860"
        );
        assert_eq!(
            normalize_base_url("http://127.0.0.1:7860/sdapi"),
            "http://127.0.0.1:7860"
        );
        assert_eq!(
            normalize_base_url("http://127.0.0.1:7860/sdapi/v1/docs/"),
            "http://127.0.0.1:7860"
        );
    }

    #[test]
    fn test_build_sdapi_endpoint_avoids_duplicate_prefix() {
        assert_eq!(
            build_sdapi_endpoint("http://127.0.0.1:7860", "txt2img"),
            "http://127.0.0.1:7860/sdapi/v1/txt2img"
        );
        assert_eq!(
            build_sdapi_endpoint("http://127.0.0.1:7860/sdapi/v1", "/txt2img"),
            "http://127.0.0.1:7860/sdapi/v1/txt2img"
        );
    }

    #[test]
    fn test_payload_carries_request_fields() {
        let request = GenerationRequest {
            seed: 42,
            n_iter: 3,
            do_not_save_grid: true,
            sd_model: Some("animagine.safetensors".to_string()),
            sampler_index: Some(1),
            ..GenerationRequest::with_prompt("1girl smile")
        };
        let samplers = vec!["Euler a".to_string(), "DPM++ 2M".to_string()];
        let payload = ForgePayload::from_request(&request, &samplers);
        let body = serde_json::to_value(&payload).unwrap();

        assert_eq!(body["prompt"], "1girl smile");
        assert_eq!(body["seed"], 42);
        assert_eq!(body["n_iter"], 3);
        assert_eq!(body["do_not_save_grid"], true);
        assert_eq!(body["sampler_name"], "DPM++ 2M");
        assert_eq!(
            body["override_settings"]["sd_model_checkpoint"],
            "animagine.safetensors"
        );
        assert!(body.get("styles").is_none());
    }

    #[test]
    fn test_response_with_info_is_aligned_and_grid_dropped() {
        let request = GenerationRequest::with_prompt("1girl");
        let info = json!({
            "all_prompts": ["1girl a", "1girl b"],
            "infotexts": ["info a", "info b"],
        });
        let response = ForgeTxt2ImgResponse {
            images: vec![
                png_base64([0, 0, 0, 255]),
                png_base64([255, 0, 0, 255]),
                format!("data:image/png;base64,{}", png_base64([0, 255, 0, 255])),
            ],
            info: Some(info.to_string()),
        };

        let processed = processed_from_response(&request, response).unwrap();
        assert_eq!(processed.images.len(), 2);
        assert_eq!(processed.all_prompts, vec!["1girl a", "1girl b"]);
        assert_eq!(processed.infotexts, vec!["info a", "info b"]);
        assert_eq!(
            processed.images[0].to_rgba8().get_pixel(0, 0),
            &Rgba([255, 0, 0, 255])
        );
    }

    #[test]
    fn test_response_without_info_repeats_request_prompt() {
        let request = GenerationRequest::with_prompt("1girl joy");
        let response = ForgeTxt2ImgResponse {
            images: vec![png_base64([1, 2, 3, 255]), "not base64!".to_string()],
            info: None,
        };

        let processed = processed_from_response(&request, response).unwrap();
        assert_eq!(processed.images.len(), 1);
        assert_eq!(processed.all_prompts, vec!["1girl joy"]);
        assert_eq!(processed.infotexts, vec![""]);
    }

    #[test]
    fn test_undecodable_response_is_an_error() {
        let request = GenerationRequest::with_prompt("1girl");
        let response = ForgeTxt2ImgResponse {
            images: vec!["data:image/png".to_string()],
            info: None,
        };
        assert!(processed_from_response(&request, response).is_err());
    }

    #[test]
    fn test_collect_named_options_dedupes() {
        let entries = vec![
            json!({"name": "Euler a"}),
            json!({"label": "Euler a"}),
            json!({"title": " DDIM "}),
            json!({"other": "x"}),
        ];
        assert_eq!(collect_named_options(&entries), vec!["Euler a", "DDIM"]);
    }

    #[test]
    fn test_connection_status_reports_missing_api() {
        let ok = connection_status(StatusCode::OK, "http://127.0.0.1:7860/sdapi/v1/samplers");
        assert!(ok.ok);
        assert_eq!(ok.message, "Connected to Forge/A1111 API");

        let missing = connection_status(
            StatusCode::NOT_FOUND,
            "http://127.0.0.1:7860/sdapi/v1/samplers",
        );
        assert!(!missing.ok);
        assert!(missing.message.starts_with("Connection failed with status 404"));
        assert!(missing.message.contains("Start Forge with --api"));

        let denied = connection_status(StatusCode::UNAUTHORIZED, "http://forge/sdapi/v1/samplers");
        assert!(!denied.ok);
        assert!(!denied.message.contains("--api"));
    }
}
