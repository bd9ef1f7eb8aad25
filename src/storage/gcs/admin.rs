//! Bucket calls against the Cloud Storage JSON API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use super::auth::TokenSource;
use crate::error::{Result, StorageError};
use crate::storage::traits::BucketAdmin;

pub(crate) struct GcsBucketAdmin {
    http: Client,
    endpoint: String,
    bucket: String,
    project_id: String,
    tokens: Arc<TokenSource>,
}

impl GcsBucketAdmin {
    pub(crate) fn new(
        endpoint: &str,
        bucket: String,
        project_id: String,
        tokens: Arc<TokenSource>,
    ) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket,
            project_id,
            tokens,
        }
    }

    fn buckets_url(&self) -> String {
        format!("{}/storage/v1/b", self.endpoint)
    }

    fn bucket_url(&self) -> String {
        format!("{}/{}", self.buckets_url(), urlencoding::encode(&self.bucket))
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let token = self.tokens.token().await?;
        Ok(request.bearer_auth(token).send().await?)
    }

    async fn failure(op: &'static str, response: reqwest::Response) -> StorageError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        StorageError::transport(op, format!("HTTP {} - {}", status, body.trim()))
    }
}

/// Whether a 409 from bucket creation means the caller already owns it, as
/// opposed to the name being taken elsewhere.
fn already_owned(body: &str) -> bool {
    body.contains("already own")
}

#[async_trait]
impl BucketAdmin for GcsBucketAdmin {
    async fn exists(&self) -> Result<bool> {
        debug!(bucket = %self.bucket, "GCS get bucket");
        let response = self.send(self.http.get(self.bucket_url())).await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::failure("get bucket", response).await),
        }
    }

    async fn create(&self, region: &str) -> Result<()> {
        debug!(bucket = %self.bucket, project = %self.project_id, "GCS insert bucket");
        let request = self
            .http
            .post(self.buckets_url())
            .query(&[("project", self.project_id.as_str())])
            .json(&json!({
                "name": self.bucket,
                "location": region,
                "storageClass": "STANDARD",
            }));

        let response = self.send(request).await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => {
                let body = response.text().await.unwrap_or_default();
                if already_owned(&body) {
                    debug!(bucket = %self.bucket, "bucket already owned");
                    Ok(())
                } else {
                    Err(StorageError::transport("create bucket", body.trim()))
                }
            }
            _ => Err(Self::failure("create bucket", response).await),
        }
    }

    async fn put_policy(&self, _policy: &str) -> Result<()> {
        Err(StorageError::transport(
            "put bucket policy",
            "bucket policy documents are not supported, use object ACLs",
        ))
    }

    async fn delete(&self) -> Result<()> {
        debug!(bucket = %self.bucket, "GCS delete bucket");
        let response = self.send(self.http.delete(self.bucket_url())).await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(self.bucket.clone())),
            _ => Err(Self::failure("delete bucket", response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_owned() {
        assert!(already_owned(
            r#"{"error":{"code":409,"message":"Your previous request to create the named bucket succeeded and you already own it."}}"#
        ));
        assert!(!already_owned(
            r#"{"error":{"code":409,"message":"The requested bucket name is not available."}}"#
        ));
    }
}
