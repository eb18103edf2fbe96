//! Best-effort copy of rendered exports to an S3-compatible bucket (B2).

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::{B2Config, FileNamingConfig};
use crate::{AppError, Result};

pub const DEFAULT_B2_ENDPOINT: &str = "https://s3.us-west-000.backblazeb2.com";

type HmacSha256 = Hmac<Sha256>;

#[async_trait]
pub trait ArchiveUploader: Send + Sync {
    async fn upload(&self, data: &[u8], filename: &str, content_type: &str) -> Result<String>;
}

/// Uploads with a SigV4-signed path-style `PUT`.
pub struct B2Uploader {
    client: reqwest::Client,
    config: B2Config,
}

impl B2Uploader {
    pub fn new(config: B2Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self) -> &str {
        if self.config.endpoint.is_empty() {
            DEFAULT_B2_ENDPOINT
        } else {
            &self.config.endpoint
        }
    }

    /// Object key: the configured prefix (without trailing `/`) plus filename.
    pub fn object_key(&self, filename: &str) -> String {
        let prefix = self.config.path_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{}", prefix, filename)
        }
    }

    /// Path-style object path with every segment encoded as SigV4 expects:
    /// only `A-Za-z0-9-_.~` stay literal.
    fn object_path(&self, key: &str) -> String {
        std::iter::once(self.config.bucket_name.as_str())
            .chain(key.split('/'))
            .map(|segment| format!("/{}", urlencoding::encode(segment)))
            .collect()
    }

    fn object_url(&self, key: &str) -> Result<url::Url> {
        let endpoint = self.endpoint();
        let mut url = url::Url::parse(endpoint)
            .map_err(|e| AppError::Archive(format!("invalid endpoint {}: {}", endpoint, e)))?;
        url.set_path(&self.object_path(key));
        Ok(url)
    }

    /// Region is the first host label after `s3.`, e.g. `us-west-000`.
    fn region(host: &str) -> &str {
        host.strip_prefix("s3.")
            .and_then(|rest| rest.split('.').next())
            .filter(|r| !r.is_empty())
            .unwrap_or("us-east-1")
    }

    fn sign(
        &self,
        url: &url::Url,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<(&'static str, String)>> {
        let host = match (url.host_str(), url.port()) {
            (Some(h), Some(p)) => format!("{}:{}", h, p),
            (Some(h), None) => h.to_string(),
            (None, _) => return Err(AppError::Archive(format!("URL without host: {}", url))),
        };
        let region = Self::region(url.host_str().unwrap_or_default());
        let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let canonical_headers = format!(
            "host:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
            host, payload_hash, timestamp
        );
        let signed_headers = "host;x-amz-content-sha256;x-amz-date";
        let canonical_request = format!(
            "PUT\n{}\n\n{}\n{}\n{}",
            url.path(),
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date, region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            timestamp,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let secret = format!("AWS4{}", self.config.application_key);
        let k_date = hmac_sha256(secret.as_bytes(), date.as_bytes())?;
        let k_region = hmac_sha256(&k_date, region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, b"s3")?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
        let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.config.application_key_id, credential_scope, signed_headers, signature
        );

        Ok(vec![
            ("Authorization", authorization),
            ("x-amz-date", timestamp),
            ("x-amz-content-sha256", payload_hash.to_string()),
        ])
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| AppError::Archive(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[async_trait]
impl ArchiveUploader for B2Uploader {
    async fn upload(&self, data: &[u8], filename: &str, content_type: &str) -> Result<String> {
        let key = self.object_key(filename);
        let url = self.object_url(&key)?;
        let payload_hash = hex::encode(Sha256::digest(data));
        let headers = self.sign(&url, &payload_hash, Utc::now())?;

        let mut request = self
            .client
            .put(url.as_str())
            .header("Content-Type", content_type);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| AppError::Archive(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Archive(format!("status {}: {}", status, body)));
        }

        tracing::info!(
            "Successfully uploaded to B2: {}/{}",
            self.config.bucket_name,
            key
        );
        Ok(key)
    }
}

/// Inputs for [`archive_filename`] that come from the current run.
#[derive(Debug, Clone, Default)]
pub struct NamingContext {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// Raw channel filter as given by the user or config
    pub channels: String,
}

/// Builds `{prefix}_{timestamp}_{date-range}_{channels}.{ext}` from the
/// enabled, non-empty parts, or `conversations.{ext}` when none apply.
pub fn archive_filename(
    naming: &FileNamingConfig,
    context: &NamingContext,
    extension: &str,
    now: DateTime<Local>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !naming.prefix.is_empty() {
        parts.push(naming.prefix.clone());
    }

    if naming.include_timestamp {
        parts.push(now.format("%Y%m%d-%H%M%S").to_string());
    }

    if naming.include_date_range {
        let range = match (context.start, context.end) {
            (Some(s), Some(e)) => Some(format!("{}-to-{}", s, e)),
            (Some(s), None) => Some(format!("from-{}", s)),
            (None, Some(e)) => Some(format!("until-{}", e)),
            (None, None) => None,
        };
        parts.extend(range);
    }

    let channels = context.channels.trim();
    if naming.include_channels && !channels.is_empty() && channels != "all" {
        parts.push(channels.replace(',', "-").replace(' ', ""));
    }

    let stem = if parts.is_empty() {
        "conversations".to_string()
    } else {
        parts.join("_")
    };

    format!("{}.{}", stem, extension)
}
