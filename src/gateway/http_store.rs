use super::{check_key, BlobStore};
use crate::error::ArtifactServiceError;
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

/// Blob store on an object-storage REST API.
///
/// Objects live at `{base_url}/storage/v1/object/{bucket}/{prefix}/{key}` and
/// every request carries the service key as a bearer token.
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    prefix: Option<String>,
    key: String,
}

impl HttpBlobStore {
    pub fn new(base_url: &str, bucket: &str, prefix: Option<&str>, key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            prefix: prefix
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
            key,
        }
    }

    pub fn object_url(&self, key: &str) -> Result<String, ArtifactServiceError> {
        check_key(key)?;
        let path = match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, key),
            None => key.to_string(),
        };
        Ok(format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, self.bucket, path
        ))
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ArtifactServiceError> {
        let url = self.object_url(key)?;
        debug!("GET {}", url);
        let resp = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.key))
            .header("apikey", self.key.clone())
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ArtifactServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(Some(resp.bytes().await?.to_vec()))
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ArtifactServiceError> {
        let url = self.object_url(key)?;
        debug!("PUT {} ({} bytes)", url, bytes.len());
        let resp = self
            .client
            .put(&url)
            .header("Authorization", format!("Bearer {}", self.key))
            .header("apikey", self.key.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .query(&[("upsert", "true")])
            .body(bytes.to_vec())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ArtifactServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("http:{}/{}", self.base_url, self.bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url() {
        let store = HttpBlobStore::new(
            "https://store.example.com/",
            "artifacts",
            None,
            "secret".to_string(),
        );
        assert_eq!(
            store.object_url("nyc_airbnb/runs/r1.json").unwrap(),
            "https://store.example.com/storage/v1/object/artifacts/nyc_airbnb/runs/r1.json"
        );
    }

    #[test]
    fn test_object_url_with_prefix() {
        let store = HttpBlobStore::new(
            "https://store.example.com",
            "artifacts",
            Some("/team/"),
            "secret".to_string(),
        );
        assert_eq!(
            store.object_url("a/b").unwrap(),
            "https://store.example.com/storage/v1/object/artifacts/team/a/b"
        );
        assert!(store.object_url("../a").is_err());
    }
}
