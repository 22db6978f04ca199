// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Vision model client for local captioning via Ollama

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use image::GenericImageView;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::VisionConfig;
use crate::error::VisionError;
use crate::Result;

/// Longest edge sent to the model
const MAX_IMAGE_EDGE: u32 = 1024;

/// Captioning collaborator: image plus prompt in, free text out
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn generate(&self, image: &[u8], prompt: &str) -> std::result::Result<String, VisionError>;

    fn model_name(&self) -> &str;
}

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    images: Vec<String>,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    name: String,
}

/// Drop `<think>...</think>` blocks, and anything after an unclosed `<think>`
pub fn strip_thinking(content: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    loop {
        // ASCII lowercasing keeps byte offsets aligned with `rest`
        let lower = rest.to_ascii_lowercase();
        let Some(start) = lower.find(OPEN) else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..start]);
        match lower[start..].find(CLOSE) {
            Some(end) => rest = &rest[start + end + CLOSE.len()..],
            None => break,
        }
    }
    out.trim().to_string()
}

/// Downscale oversized images and re-encode to JPEG
pub fn prepare_image(bytes: &[u8]) -> std::result::Result<Vec<u8>, VisionError> {
    let img = image::load_from_memory(bytes).map_err(|e| VisionError::Image(e.to_string()))?;

    let (width, height) = img.dimensions();
    let img = if width > MAX_IMAGE_EDGE || height > MAX_IMAGE_EDGE {
        debug!("Resizing {}x{} image for the vision model", width, height);
        img.resize(MAX_IMAGE_EDGE, MAX_IMAGE_EDGE, image::imageops::FilterType::Triangle)
    } else {
        img
    };

    // JPEG has no alpha channel
    let img = image::DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buffer = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Jpeg)
        .map_err(|e| VisionError::Image(e.to_string()))?;
    Ok(buffer)
}

fn parse_generate_response(body: &str) -> std::result::Result<String, VisionError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| VisionError::InvalidResponse(e.to_string()))?;
    let text = strip_thinking(&response.response);
    if text.is_empty() {
        if !response.response.trim().is_empty() {
            warn!("Model output was entirely inside <think> tags");
        }
        return Err(VisionError::InvalidResponse("empty response from model".to_string()));
    }
    Ok(text)
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: &VisionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        // Normalize URL
        let base_url = config
            .endpoint
            .trim_end_matches('/')
            .replace("/api/generate", "")
            .replace("/api/chat", "");

        Ok(Self {
            client,
            base_url,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
        })
    }

    fn map_error(&self, e: reqwest::Error) -> VisionError {
        if e.is_timeout() {
            VisionError::Timeout(self.timeout_secs)
        } else if e.is_connect() || e.is_request() {
            VisionError::Unreachable(format!("{}: {}", self.base_url, e))
        } else {
            VisionError::InvalidResponse(e.to_string())
        }
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> std::result::Result<(), VisionError> {
        let url = format!("{}/api/tags", self.base_url);

        self.client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| VisionError::Unreachable(format!("Cannot connect to Ollama at {}: {}", self.base_url, e)))?;

        Ok(())
    }

    /// List available models
    pub async fn list_models(&self) -> std::result::Result<Vec<String>, VisionError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await.map_err(|e| self.map_error(e))?;
        let tags: TagsResponse = response.json().await.map_err(|e| self.map_error(e))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Check if the configured model is available
    pub async fn model_available(&self) -> std::result::Result<bool, VisionError> {
        let models = self.list_models().await?;
        Ok(models
            .iter()
            .any(|m| m.starts_with(&self.model) || m == &format!("{}:latest", self.model)))
    }
}

#[async_trait]
impl VisionModel for OllamaClient {
    async fn generate(&self, image: &[u8], prompt: &str) -> std::result::Result<String, VisionError> {
        let url = format!("{}/api/generate", self.base_url);
        let prepared = prepare_image(image)?;

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            images: vec![general_purpose::STANDARD.encode(&prepared)],
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        debug!("Sending vision request to Ollama: model={}", self.model);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        if !response.status().is_success() {
            return Err(VisionError::InvalidResponse(format!(
                "Ollama returned status {}",
                response.status()
            )));
        }

        let body = response.text().await.map_err(|e| self.map_error(e))?;
        parse_generate_response(&body)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_thinking() {
        assert_eq!(strip_thinking("<think>hmm\nok</think> A cat."), "A cat.");
        assert_eq!(strip_thinking("A <THINK>x</Think>dog<think>y</think>."), "A dog.");
        assert_eq!(strip_thinking("Caption <think>cut off"), "Caption");
        assert_eq!(strip_thinking("<think>only thoughts"), "");
        assert_eq!(strip_thinking("plain"), "plain");
    }

    #[test]
    fn test_parse_generate_response() {
        assert_eq!(parse_generate_response(r#"{"response": " A bridge. "}"#).unwrap(), "A bridge.");
        assert!(matches!(
            parse_generate_response(r#"{"response": "<think>...</think>"}"#),
            Err(VisionError::InvalidResponse(_))
        ));
        assert!(matches!(parse_generate_response("not json"), Err(VisionError::InvalidResponse(_))));
    }

    #[test]
    fn test_prepare_image_downscales() {
        let img = image::RgbaImage::new(2048, 512);
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let jpeg = prepare_image(&png).unwrap();
        let decoded = image::load_from_memory_with_format(&jpeg, image::ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (1024, 256));
    }

    #[test]
    fn test_prepare_image_rejects_garbage() {
        assert!(matches!(prepare_image(b"nope"), Err(VisionError::Image(_))));
    }

    #[test]
    fn test_endpoint_normalized() {
        let config = VisionConfig {
            endpoint: "http://localhost:11434/api/generate/".to_string(),
            ..VisionConfig::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.model_name(), "llama3.2-vision");
    }
}
