//! Bucket calls against an S3-compatible endpoint.
//!
//! Path-style requests (`{endpoint}/{bucket}`) signed with SigV4, which is
//! what MinIO and AWS both accept.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, StatusCode};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

use super::sigv4::{self, Credentials};
use crate::error::{Result, StorageError};
use crate::storage::traits::BucketAdmin;

const SERVICE: &str = "s3";
const DEFAULT_REGION: &str = "us-east-1";

pub(crate) struct S3BucketAdmin {
    http: Client,
    endpoint: Url,
    bucket: String,
    credentials: Credentials,
}

impl S3BucketAdmin {
    pub(crate) fn new(endpoint: Url, bucket: String, credentials: Credentials) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            bucket,
            credentials,
        }
    }

    fn host(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    fn bucket_path(&self) -> String {
        format!("/{}", urlencoding::encode(&self.bucket))
    }

    async fn send(&self, method: Method, query: &str, body: Vec<u8>) -> Result<reqwest::Response> {
        let now = Utc::now();
        let payload_hash = sigv4::sha256_hex(&body);
        let amz_date = sigv4::amz_date(now);
        let path = self.bucket_path();

        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), self.host());
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
        headers.insert("x-amz-date".to_string(), amz_date.clone());

        let authorization = sigv4::authorization(
            &self.credentials,
            SERVICE,
            method.as_str(),
            &path,
            query,
            &headers,
            &payload_hash,
            now,
        );

        let mut url = self.endpoint.clone();
        url.set_path(&path);
        url.set_query((!query.is_empty()).then_some(query));

        debug!(method = %method, url = %url, "S3 bucket request");
        let mut request = self
            .http
            .request(method, url)
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", payload_hash)
            .header(reqwest::header::AUTHORIZATION, authorization);
        if !body.is_empty() {
            request = request.body(body);
        }
        Ok(request.send().await?)
    }

    async fn failure(op: &'static str, response: reqwest::Response) -> StorageError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        StorageError::transport(op, format!("HTTP {} - {}", status, body.trim()))
    }
}

/// Body for bucket creation outside the default region.
fn create_bucket_body(region: &str) -> Vec<u8> {
    if region.is_empty() || region == DEFAULT_REGION {
        return Vec::new();
    }
    format!(
        "<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
         <LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>",
        region
    )
    .into_bytes()
}

#[async_trait]
impl BucketAdmin for S3BucketAdmin {
    async fn exists(&self) -> Result<bool> {
        let response = self.send(Method::HEAD, "", Vec::new()).await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::failure("head bucket", response).await),
        }
    }

    async fn create(&self, region: &str) -> Result<()> {
        let response = self
            .send(Method::PUT, "", create_bucket_body(region))
            .await?;
        if response.status().is_success() {
            return Ok(());
        }
        if response.status() == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            if body.contains("BucketAlreadyOwnedByYou") {
                return Ok(());
            }
            return Err(StorageError::transport("create bucket", body.trim()));
        }
        Err(Self::failure("create bucket", response).await)
    }

    async fn put_policy(&self, policy: &str) -> Result<()> {
        let response = self
            .send(Method::PUT, "policy=", policy.as_bytes().to_vec())
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::failure("put bucket policy", response).await)
        }
    }

    async fn delete(&self) -> Result<()> {
        let response = self.send(Method::DELETE, "", Vec::new()).await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(self.bucket.clone())),
            _ => Err(Self::failure("delete bucket", response).await),
        }
    }
}
