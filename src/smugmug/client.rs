// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! SmugMug API v2 client
//!
//! Requests are signed with OAuth 1.0a PLAINTEXT using an access token that
//! was obtained beforehand; the token handshake itself lives outside this
//! crate.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Album, AlbumImage, PhotoHost};
use crate::config::SmugMugConfig;
use crate::formatter::MetadataUpdate;
use crate::{Result, SmugvisionError};

const API_HOST: &str = "https://api.smugmug.com";
const BASE_URL: &str = "https://api.smugmug.com/api/v2";
const PAGE_SIZE: u64 = 100;

/// SmugMug API client
pub struct SmugMugClient {
    client: Client,
    credentials: SmugMugConfig,
}

/// Map a failed response to the crate error taxonomy
fn status_error(status: StatusCode, body: &str, what: &str) -> SmugvisionError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("Message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| format!("request for {} failed", what));

    match status {
        StatusCode::UNAUTHORIZED => SmugvisionError::HostAuth(message),
        StatusCode::NOT_FOUND => SmugvisionError::NotFound(what.to_string()),
        _ => SmugvisionError::HostApi {
            status: status.as_u16(),
            message,
        },
    }
}

fn absolute_url(endpoint: &str) -> String {
    if endpoint.starts_with("http") {
        endpoint.to_string()
    } else if endpoint.starts_with("/api/v2") {
        format!("{}{}", API_HOST, endpoint)
    } else {
        format!("{}{}", BASE_URL, endpoint)
    }
}

/// Pick the download URL for `size` from an `ImageSizes` response body
pub fn pick_size_url(sizes: &Value, size: &str) -> Option<String> {
    let sizes = sizes.pointer("/Response/ImageSizes").unwrap_or(sizes);
    sizes
        .get(format!("{}ImageUrl", size))
        .or_else(|| sizes.get("LargestImageUrl"))
        .and_then(Value::as_str)
        .map(String::from)
}

impl SmugMugClient {
    pub fn new(credentials: &SmugMugConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!("smugvision/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            credentials: credentials.clone(),
        })
    }

    /// OAuth 1.0a `Authorization` header value using the PLAINTEXT method
    fn authorization(&self) -> String {
        let enc = |s: &str| urlencoding::encode(s).into_owned();
        let signature = format!(
            "{}&{}",
            enc(&self.credentials.api_secret),
            enc(&self.credentials.user_secret)
        );
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let timestamp = chrono::Utc::now().timestamp().to_string();

        let params = [
            ("oauth_consumer_key", self.credentials.api_key.as_str()),
            ("oauth_token", self.credentials.user_token.as_str()),
            ("oauth_signature_method", "PLAINTEXT"),
            ("oauth_signature", signature.as_str()),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_nonce", nonce.as_str()),
            ("oauth_version", "1.0"),
        ];
        let joined = params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, enc(v)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("OAuth {}", joined)
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Value> {
        let url = absolute_url(endpoint);
        debug!("SmugMug API {} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .header("Accept", "application/json")
            .header("Authorization", self.authorization())
            .query(query);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(status_error(status, &text, endpoint));
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn download_url(&self, image: &AlbumImage, size: &str) -> Result<String> {
        if let Some(sizes_uri) = &image.image_sizes_uri {
            match self.request(Method::GET, sizes_uri, &[], None).await {
                Ok(sizes) => {
                    if let Some(url) = pick_size_url(&sizes, size) {
                        return Ok(url);
                    }
                }
                Err(e) if e.is_fatal_for_batch() => return Err(e),
                Err(e) => warn!("Could not fetch image sizes for {}: {}", image.file_name, e),
            }
        }
        if let Some(archived) = image.archived_uri.as_ref().filter(|_| size == "Original") {
            return Ok(archived.clone());
        }
        Err(SmugvisionError::NotFound(format!(
            "download URL for {} ({})",
            image.file_name, size
        )))
    }
}

#[async_trait]
impl PhotoHost for SmugMugClient {
    async fn fetch_album(&self, album_key: &str) -> Result<Album> {
        info!("Fetching album: {}", album_key);
        let response = self
            .request(Method::GET, &format!("/album/{}", album_key), &[], None)
            .await?;
        let data = response.pointer("/Response/Album").ok_or_else(|| {
            SmugvisionError::HostApi {
                status: 200,
                message: "response has no Album".to_string(),
            }
        })?;
        Ok(Album::from_api(data))
    }

    async fn fetch_album_images(&self, album_key: &str) -> Result<Vec<AlbumImage>> {
        let endpoint = format!("/album/{}!images", album_key);
        let mut images = Vec::new();
        let mut start = 1u64;

        loop {
            let query = [
                ("start", start.to_string()),
                ("count", PAGE_SIZE.to_string()),
            ];
            let response = self.request(Method::GET, &endpoint, &query, None).await?;
            let page = response
                .pointer("/Response/AlbumImage")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if page.is_empty() {
                break;
            }

            images.extend(page.iter().map(|data| AlbumImage::from_api(data, album_key)));
            debug!("Retrieved {} images (start={})", page.len(), start);

            if response.pointer("/Response/Pages/NextPage").is_none() {
                break;
            }
            start += page.len() as u64;
        }

        info!("Retrieved {} images from album {}", images.len(), album_key);
        Ok(images)
    }

    async fn download(&self, image: &AlbumImage, size: &str) -> Result<Vec<u8>> {
        let url = self.download_url(image, size).await?;
        debug!("Downloading {} ({})", image.file_name, size);

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.authorization())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, "", &image.file_name));
        }
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("text/html"))
            .unwrap_or(false);
        if is_html {
            return Err(SmugvisionError::HostApi {
                status: status.as_u16(),
                message: format!("received HTML instead of image data for {}", image.file_name),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn update_metadata(&self, image_key: &str, update: &MetadataUpdate) -> Result<()> {
        let body = json!({
            "Caption": update.caption,
            "Keywords": update.keywords_string(),
        });
        self.request(Method::PATCH, &format!("/image/{}", image_key), &[], Some(body))
            .await?;
        info!("Updated metadata for image {}", image_key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SmugMugClient {
        SmugMugClient::new(&SmugMugConfig {
            api_key: "key".into(),
            api_secret: "sec&ret".into(),
            user_token: "token".into(),
            user_secret: "tok secret".into(),
        })
        .unwrap()
    }

    #[test]
    fn test_authorization_header() {
        let header = client().authorization();
        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_consumer_key=\"key\""));
        assert!(header.contains("oauth_signature_method=\"PLAINTEXT\""));
        // secrets are encoded, joined by '&', then encoded again
        assert!(header.contains("oauth_signature=\"sec%2526ret%26tok%2520secret\""));
    }

    #[test]
    fn test_status_mapping() {
        let err = status_error(StatusCode::UNAUTHORIZED, r#"{"Message":"bad token"}"#, "/album/x");
        assert!(matches!(&err, SmugvisionError::HostAuth(m) if m == "bad token"));
        assert!(err.is_fatal_for_batch());

        let err = status_error(StatusCode::FORBIDDEN, "", "/image/y");
        assert!(err.is_fatal_for_batch());

        let err = status_error(StatusCode::NOT_FOUND, "", "/album/z");
        assert!(matches!(err, SmugvisionError::NotFound(_)));

        let err = status_error(StatusCode::INTERNAL_SERVER_ERROR, "oops", "/album/z");
        assert!(matches!(err, SmugvisionError::HostApi { status: 500, .. }));
        assert!(!err.is_fatal_for_batch());
    }

    #[test]
    fn test_urls() {
        assert_eq!(absolute_url("/album/x"), "https://api.smugmug.com/api/v2/album/x");
        assert_eq!(
            absolute_url("/api/v2/image/a!sizes"),
            "https://api.smugmug.com/api/v2/image/a!sizes"
        );

        let sizes = json!({"Response": {"ImageSizes": {
            "MediumImageUrl": "https://photos/m.jpg",
            "LargestImageUrl": "https://photos/l.jpg"
        }}});
        assert_eq!(pick_size_url(&sizes, "Medium").unwrap(), "https://photos/m.jpg");
        assert_eq!(pick_size_url(&sizes, "X3Large").unwrap(), "https://photos/l.jpg");
    }
}
