//! Operation dispatcher for the editing studio: the adaptive image
//! normalizer, the transformation-service clients (Gemini plus an offline
//! dryrun), and the [`EditEngine`] that strings validate → normalize →
//! compose → call → extract together for one submission.

use std::env;
use std::fmt;
use std::io::Cursor;
use std::thread;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use atelier_contracts::directive;
use atelier_contracts::error::{EditError, MERGE_NEEDS_REFERENCE_MESSAGE};
use atelier_contracts::events::EventWriter;
use atelier_contracts::image::{EditedImage, WorkingImage};
use atelier_contracts::models::ModelCatalog;
use atelier_contracts::request::OperationRequest;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 90;

const TRANSPORT_RETRIES: usize = 2;
const RETRY_BACKOFF_SECONDS: f64 = 1.2;
const DRYRUN_DIMENSION: u32 = 512;

/// Keep request timeouts in a range that is long enough for image models and
/// short enough that a silent service still resolves to a failure.
pub fn clamp_timeout(seconds: u64) -> Duration {
    Duration::from_secs(seconds.clamp(15, 300))
}

// ---------------------------------------------------------------------------
// Image normalizer
// ---------------------------------------------------------------------------

/// Size and byte budgets for one normalization tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeBudget {
    pub max_dimension: u32,
    pub max_bytes: usize,
    pub jpeg_quality: u8,
}

/// Allowance for single-image operations.
pub const NORMAL_BUDGET: NormalizeBudget = NormalizeBudget {
    max_dimension: 1536,
    max_bytes: 1_572_864,
    jpeg_quality: 85,
};

/// Tighter allowance for payloads that carry more than one image.
pub const AGGRESSIVE_BUDGET: NormalizeBudget = NormalizeBudget {
    max_dimension: 1024,
    max_bytes: 838_860,
    jpeg_quality: 70,
};

/// The raster surface the normalizer works through. A trait seam so tests can
/// substitute a surface that refuses to decode.
pub trait Raster {
    /// Pixel dimensions, if the bytes decode at all.
    fn probe(&self, bytes: &[u8]) -> Result<(u32, u32), EditError>;

    /// Flatten onto an opaque white canvas, scale to exactly the given size,
    /// and encode as JPEG at the given quality.
    fn flatten_scaled_jpeg(
        &self,
        bytes: &[u8],
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<Vec<u8>, EditError>;
}

/// `image`-crate backed raster surface.
pub struct ImageRaster;

impl Raster for ImageRaster {
    fn probe(&self, bytes: &[u8]) -> Result<(u32, u32), EditError> {
        let decoded = image::load_from_memory(bytes).map_err(decode_error)?;
        Ok(decoded.dimensions())
    }

    fn flatten_scaled_jpeg(
        &self,
        bytes: &[u8],
        width: u32,
        height: u32,
        quality: u8,
    ) -> Result<Vec<u8>, EditError> {
        let decoded = image::load_from_memory(bytes).map_err(decode_error)?;
        let rgba = decoded.to_rgba8();
        let mut flattened = RgbaImage::new(rgba.width(), rgba.height());
        for (x, y, pixel) in rgba.enumerate_pixels() {
            let alpha = u16::from(pixel[3]);
            let blend = |channel: u8| -> u8 {
                (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8
            };
            flattened.put_pixel(
                x,
                y,
                Rgba([blend(pixel[0]), blend(pixel[1]), blend(pixel[2]), 255]),
            );
        }
        let mut working = DynamicImage::ImageRgba8(flattened);
        if working.dimensions() != (width, height) {
            working = working.resize_exact(width, height, FilterType::Triangle);
        }
        let rgb = working.to_rgb8();
        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
        encoder
            .encode_image(&DynamicImage::ImageRgb8(rgb))
            .map_err(|err| EditError::Decode(format!("jpeg encode failed: {err}")))?;
        Ok(out)
    }
}

fn decode_error(err: image::ImageError) -> EditError {
    EditError::Decode(format!("image decode failed: {err}"))
}

/// Converts arbitrary input images into a transport representation that fits
/// the tier's budgets. Within budget the bytes pass through untouched, alpha
/// included; over budget the image is scaled (never up), flattened onto
/// white, and re-encoded as JPEG. The byte budget is advisory: one re-encode
/// at the tier's quality, no truncation loop. Inputs without a usable raster
/// surface are shipped unmodified.
pub struct Normalizer {
    raster: Box<dyn Raster + Send + Sync>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(Box::new(ImageRaster))
    }
}

impl Normalizer {
    pub fn new(raster: Box<dyn Raster + Send + Sync>) -> Self {
        Self { raster }
    }

    pub fn normalize(&self, bytes: &[u8], media_type: &str, aggressive: bool) -> ImagePart {
        let budget = if aggressive {
            AGGRESSIVE_BUDGET
        } else {
            NORMAL_BUDGET
        };
        self.normalize_with_budget(bytes, media_type, budget)
    }

    pub fn normalize_with_budget(
        &self,
        bytes: &[u8],
        media_type: &str,
        budget: NormalizeBudget,
    ) -> ImagePart {
        match self.try_normalize(bytes, media_type, budget) {
            Ok(part) => part,
            // Decode failures stay local: the service sees the original bytes.
            Err(_) => ImagePart {
                media_type: media_type.to_string(),
                data: bytes.to_vec(),
            },
        }
    }

    fn try_normalize(
        &self,
        bytes: &[u8],
        media_type: &str,
        budget: NormalizeBudget,
    ) -> Result<ImagePart, EditError> {
        let (width, height) = self.raster.probe(bytes)?;
        let needs_resize = width > budget.max_dimension || height > budget.max_dimension;
        let needs_reencode = bytes.len() > budget.max_bytes;
        if !needs_resize && !needs_reencode {
            return Ok(ImagePart {
                media_type: media_type.to_string(),
                data: bytes.to_vec(),
            });
        }
        let (target_width, target_height) = fit_within(width, height, budget.max_dimension);
        let data =
            self.raster
                .flatten_scaled_jpeg(bytes, target_width, target_height, budget.jpeg_quality)?;
        Ok(ImagePart {
            media_type: "image/jpeg".to_string(),
            data,
        })
    }
}

/// Scale to fit the max dimension preserving aspect ratio. Images already
/// inside the bound keep their dimensions; nothing is ever upscaled.
fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if width <= max_dimension && height <= max_dimension {
        return (width, height);
    }
    let ratio = (f64::from(max_dimension) / f64::from(width))
        .min(f64::from(max_dimension) / f64::from(height));
    let target_width = (f64::from(width) * ratio).round().max(1.0) as u32;
    let target_height = (f64::from(height) * ratio).round().max(1.0) as u32;
    (target_width, target_height)
}

// ---------------------------------------------------------------------------
// Transformation services
// ---------------------------------------------------------------------------

/// One inline image travelling to or from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    pub media_type: String,
    pub data: Vec<u8>,
}

/// Everything useful pulled out of one service reply.
#[derive(Debug, Clone, Default)]
pub struct ServiceReply {
    pub images: Vec<ImagePart>,
    pub texts: Vec<String>,
}

/// A remote (or scripted) model endpoint.
pub trait TransformService: Send + Sync {
    fn name(&self) -> &str;

    /// Send ordered image parts plus the directive to an image model.
    fn transform(
        &self,
        model: &str,
        images: &[ImagePart],
        directive: &str,
    ) -> Result<ServiceReply, EditError>;

    /// Text-only rewrite through a text model. May come back empty; the
    /// caller decides whether that is a failure.
    fn rewrite(
        &self,
        model: &str,
        system_instruction: &str,
        text: &str,
    ) -> Result<String, EditError>;
}

pub struct GeminiService {
    api_base: String,
    http: HttpClient,
    timeout: Duration,
}

impl GeminiService {
    pub fn new(timeout: Duration) -> Self {
        Self {
            api_base: env::var("GEMINI_API_BASE")
                .ok()
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            http: HttpClient::new(),
            timeout,
        }
    }

    fn api_key() -> Result<String, EditError> {
        non_empty_env("GEMINI_API_KEY")
            .or_else(|| non_empty_env("GOOGLE_API_KEY"))
            .ok_or_else(|| {
                EditError::Transport("GEMINI_API_KEY or GOOGLE_API_KEY not set".to_string())
            })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn post_with_transport_retries(
        &self,
        endpoint: &str,
        api_key: &str,
        payload: &Value,
    ) -> Result<HttpResponse, EditError> {
        for attempt in 0..=TRANSPORT_RETRIES {
            let response = self
                .http
                .post(endpoint)
                .query(&[("key", api_key)])
                .timeout(self.timeout)
                .json(payload)
                .send();

            match response {
                Ok(ok) => return Ok(ok),
                Err(err) => {
                    if !is_retryable_transport_error(&err) || attempt >= TRANSPORT_RETRIES {
                        return Err(self.transport_error(endpoint, &err));
                    }
                    let delay = RETRY_BACKOFF_SECONDS * (attempt as f64 + 1.0);
                    thread::sleep(Duration::from_secs_f64(delay));
                }
            }
        }
        unreachable!("transport retry loop always returns a response or error")
    }

    fn transport_error(&self, endpoint: &str, err: &reqwest::Error) -> EditError {
        if err.is_timeout() {
            return EditError::Transport(format!(
                "Gemini request timed out after {}s ({endpoint})",
                self.timeout.as_secs()
            ));
        }
        EditError::Transport(format!("Gemini request failed ({endpoint}): {err}"))
    }
}

impl TransformService for GeminiService {
    fn name(&self) -> &str {
        "gemini"
    }

    fn transform(
        &self,
        model: &str,
        images: &[ImagePart],
        directive: &str,
    ) -> Result<ServiceReply, EditError> {
        let api_key = Self::api_key()?;
        let endpoint = self.endpoint_for_model(model);
        let mut parts: Vec<Value> = images.iter().map(inline_image_part).collect();
        parts.push(json!({ "text": directive }));
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
            },
        });
        let response = self.post_with_transport_retries(&endpoint, &api_key, &payload)?;
        let response_payload = response_json_or_error("Gemini", response)?;
        extract_reply(&response_payload)
    }

    fn rewrite(
        &self,
        model: &str,
        system_instruction: &str,
        text: &str,
    ) -> Result<String, EditError> {
        let api_key = Self::api_key()?;
        let endpoint = self.endpoint_for_model(model);
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": text }],
            }],
            "systemInstruction": {
                "parts": [{ "text": system_instruction }],
            },
        });
        let response = self.post_with_transport_retries(&endpoint, &api_key, &payload)?;
        let response_payload = response_json_or_error("Gemini", response)?;
        let reply = extract_reply(&response_payload)?;
        Ok(reply.texts.concat().trim().to_string())
    }
}

fn inline_image_part(part: &ImagePart) -> Value {
    json!({
        "inlineData": {
            "mimeType": part.media_type,
            "data": BASE64.encode(&part.data),
        }
    })
}

/// Pull image and text parts out of a `generateContent` response. Accepts
/// both camelCase and snake_case field spellings; a reply image without a
/// media type is treated as PNG.
fn extract_reply(response_payload: &Value) -> Result<ServiceReply, EditError> {
    let candidates = response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut reply = ServiceReply::default();

    for candidate in candidates {
        let parts = candidate
            .get("content")
            .and_then(Value::as_object)
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                if !text.trim().is_empty() {
                    reply.texts.push(text.to_string());
                }
            }
            let inline = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let bytes = BASE64.decode(data.as_bytes()).map_err(|_| {
                EditError::Transport("Gemini image payload was not valid base64".to_string())
            })?;
            let media_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png")
                .to_string();
            reply.images.push(ImagePart {
                media_type,
                data: bytes,
            });
        }
    }

    Ok(reply)
}

/// Offline provider fabricating deterministic results, so the whole pipeline
/// runs in tests and plumbing checks without credentials.
pub struct DryrunService;

impl TransformService for DryrunService {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn transform(
        &self,
        _model: &str,
        _images: &[ImagePart],
        directive: &str,
    ) -> Result<ServiceReply, EditError> {
        let (r, g, b) = color_from_directive(directive);
        let canvas = RgbImage::from_pixel(DRYRUN_DIMENSION, DRYRUN_DIMENSION, Rgb([r, g, b]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(canvas)
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|err| EditError::Transport(format!("dryrun image encode failed: {err}")))?;
        Ok(ServiceReply {
            images: vec![ImagePart {
                media_type: "image/png".to_string(),
                data: out.into_inner(),
            }],
            texts: Vec::new(),
        })
    }

    fn rewrite(
        &self,
        _model: &str,
        _system_instruction: &str,
        text: &str,
    ) -> Result<String, EditError> {
        Ok(format!(
            "{}, rendered with photorealistic detail, balanced studio lighting, high dynamic range",
            text.trim()
        ))
    }
}

fn color_from_directive(directive: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(directive.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

fn service_for_provider(
    provider: &str,
    timeout: Duration,
) -> Result<Box<dyn TransformService>, EditError> {
    match provider {
        "gemini" => Ok(Box::new(GeminiService::new(timeout))),
        "dryrun" => Ok(Box::new(DryrunService)),
        other => Err(EditError::Validation(format!(
            "no service available for provider '{other}'"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Edit engine
// ---------------------------------------------------------------------------

/// Dispatcher for one editing session: normalizer, the image and text model
/// routes, and the event stream.
pub struct EditEngine {
    normalizer: Normalizer,
    image_service: Box<dyn TransformService>,
    text_service: Box<dyn TransformService>,
    image_model: String,
    text_model: String,
    events: EventWriter,
}

impl fmt::Debug for EditEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditEngine")
            .field("image_model", &self.image_model)
            .field("text_model", &self.text_model)
            .finish_non_exhaustive()
    }
}

impl EditEngine {
    pub fn new(
        events: EventWriter,
        catalog: &ModelCatalog,
        image_model: &str,
        text_model: &str,
        timeout: Duration,
    ) -> Result<Self, EditError> {
        let image_spec = catalog.ensure(image_model, "image")?;
        let text_spec = catalog.ensure(text_model, "text")?;
        Ok(Self {
            normalizer: Normalizer::default(),
            image_service: service_for_provider(&image_spec.provider, timeout)?,
            text_service: service_for_provider(&text_spec.provider, timeout)?,
            image_model: image_spec.name,
            text_model: text_spec.name,
            events,
        })
    }

    /// Explicit-service constructor for tests and embedding.
    pub fn with_services(
        events: EventWriter,
        image_service: Box<dyn TransformService>,
        text_service: Box<dyn TransformService>,
        image_model: impl Into<String>,
        text_model: impl Into<String>,
    ) -> Self {
        Self {
            normalizer: Normalizer::default(),
            image_service,
            text_service,
            image_model: image_model.into(),
            text_model: text_model.into(),
            events,
        }
    }

    pub fn image_model(&self) -> &str {
        &self.image_model
    }

    pub fn text_model(&self) -> &str {
        &self.text_model
    }

    /// Run one operation end to end. Merge is validated before any image or
    /// network work; the first image part of the reply is the result, a
    /// text-only reply surfaces as a refusal, an empty reply as silence.
    pub fn submit(
        &self,
        request: &OperationRequest,
        working: &WorkingImage,
        reference: Option<&WorkingImage>,
    ) -> Result<EditedImage, EditError> {
        let reference = if request.needs_reference() {
            match reference {
                Some(image) => Some(image),
                None => {
                    return Err(EditError::Validation(
                        MERGE_NEEDS_REFERENCE_MESSAGE.to_string(),
                    ))
                }
            }
        } else {
            // Single-image operations ignore a stray reference.
            None
        };

        let directive = directive::compose(request);
        // Standard budgets even for merge's two inputs: blending needs the
        // detail a tighter re-encode would strip.
        let mut images = vec![self
            .normalizer
            .normalize(&working.bytes, &working.media_type, false)];
        if let Some(reference) = reference {
            images.push(
                self.normalizer
                    .normalize(&reference.bytes, &reference.media_type, false),
            );
        }

        self.emit(
            "transform_requested",
            json!({
                "operation": request.kind().key(),
                "model": self.image_model,
                "images": images.len(),
                "input_bytes": working.byte_len(),
                "payload_bytes": images.iter().map(|part| part.data.len()).sum::<usize>(),
                "directive_chars": directive.chars().count(),
            }),
        );

        let started = Instant::now();
        let outcome = self
            .image_service
            .transform(&self.image_model, &images, &directive)
            .and_then(first_image);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(result) => self.emit(
                "transform_succeeded",
                json!({
                    "operation": request.kind().key(),
                    "artifact_id": short_artifact_id(&result.data),
                    "media_type": result.media_type,
                    "bytes": result.data.len(),
                    "elapsed_ms": elapsed_ms,
                }),
            ),
            Err(error) => self.emit(
                "transform_failed",
                json!({
                    "operation": request.kind().key(),
                    "error_kind": error.kind(),
                    "message": truncate_text(error.message(), 512),
                    "elapsed_ms": elapsed_ms,
                }),
            ),
        }

        outcome
    }

    /// Standalone prompt rewrite through the text model. An empty reply is a
    /// failure rather than an empty success.
    pub fn enhance_prompt(&self, prompt: &str) -> Result<String, EditError> {
        let request_text = directive::polish_request(prompt);
        let outcome = self
            .text_service
            .rewrite(
                &self.text_model,
                directive::POLISH_SYSTEM_INSTRUCTION,
                &request_text,
            )
            .and_then(|rewritten| {
                let rewritten = rewritten.trim().to_string();
                if rewritten.is_empty() {
                    Err(EditError::empty_rewrite())
                } else {
                    Ok(rewritten)
                }
            });

        match &outcome {
            Ok(rewritten) => self.emit(
                "prompt_polished",
                json!({
                    "model": self.text_model,
                    "chars_before": prompt.chars().count(),
                    "chars_after": rewritten.chars().count(),
                }),
            ),
            Err(error) => self.emit(
                "prompt_polish_failed",
                json!({
                    "model": self.text_model,
                    "error_kind": error.kind(),
                    "message": truncate_text(error.message(), 512),
                }),
            ),
        }

        outcome
    }

    // Event logging is best-effort; an unwritable log must not fail an edit.
    fn emit(&self, event_type: &str, payload: Value) {
        let _ = self.events.emit(event_type, map_object(payload));
    }
}

/// First image part wins; otherwise the first non-empty text is surfaced
/// verbatim as a refusal; otherwise the generic no-image failure.
fn first_image(reply: ServiceReply) -> Result<EditedImage, EditError> {
    if let Some(part) = reply.images.into_iter().next() {
        return Ok(EditedImage::new(part.media_type, part.data));
    }
    match reply
        .texts
        .into_iter()
        .find(|text| !text.trim().is_empty())
    {
        Some(text) => Err(EditError::ServiceRefusal(text)),
        None => Err(EditError::silence()),
    }
}

/// Stable short id for a result payload, for events and default filenames.
pub fn short_artifact_id(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    format!("edit-{}", hex::encode(&digest[..4]))
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value, EditError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().map_err(|err| {
        EditError::Transport(format!("{provider} response body read failed: {err}"))
    })?;
    if !status.is_success() {
        return Err(EditError::Transport(format!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        )));
    }
    serde_json::from_str(&body).map_err(|_| {
        EditError::Transport(format!("{provider} returned invalid JSON payload"))
    })
}

fn is_retryable_transport_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
