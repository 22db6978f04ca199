// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Face detection over HTTP
//!
//! The service accepts a multipart upload with an `image` field and answers
//! `{"encodings": [[f64; N], ...]}`, one vector per detected face.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{Encoding, FaceDetector};
use crate::config::FaceConfig;
use crate::{Result, SmugvisionError};

#[derive(Deserialize)]
struct EncodeResponse {
    #[serde(default)]
    encodings: Vec<Encoding>,
}

/// Client for a face-encoding service
pub struct RemoteFaceDetector {
    client: Client,
    endpoint: String,
}

impl RemoteFaceDetector {
    pub fn new(config: &FaceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }
}

fn parse_encodings(body: &str) -> Result<Vec<Encoding>> {
    let response: EncodeResponse = serde_json::from_str(body)
        .map_err(|e| SmugvisionError::Faces(format!("Invalid detector response: {}", e)))?;
    Ok(response.encodings.into_iter().filter(|e| !e.is_empty()).collect())
}

#[async_trait]
impl FaceDetector for RemoteFaceDetector {
    async fn detect_faces(&self, image: &[u8]) -> Result<Vec<Encoding>> {
        let part = Part::bytes(image.to_vec())
            .file_name("image.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new().part("image", part);

        let response = self.client.post(&self.endpoint).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(SmugvisionError::Faces(format!(
                "Face detector returned status {}",
                response.status()
            )));
        }

        let encodings = parse_encodings(&response.text().await?)?;
        debug!("Face detector found {} face(s)", encodings.len());
        Ok(encodings)
    }
}
