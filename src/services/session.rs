use std::path::Path;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::{Credentials, SharedCredentialsProvider};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, ObjectCannedAcl, ServerSideEncryption,
};
use aws_sdk_s3::Client;

use crate::core::config::Config;

/// The outcome of one successfully uploaded part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartDescriptor {
    pub part_number: i32,
    pub etag: String,
    pub size: u64,
}

/// The four multipart operations the pipeline needs from a remote store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Establish a multipart upload session, returning its upload id.
    async fn create(&self) -> Result<String>;

    /// Upload one staged chunk as the numbered part.
    async fn upload_part(
        &self,
        upload_id: &str,
        part_number: i32,
        staged: &Path,
    ) -> Result<PartDescriptor>;

    /// Finalize the session from the ascending part list.
    async fn complete(&self, upload_id: &str, parts: &[PartDescriptor]) -> Result<()>;

    /// Discard the session and every part uploaded so far.
    async fn abort(&self, upload_id: &str) -> Result<()>;
}

/// Multipart sessions against a fixed S3 bucket/key.
pub struct S3Sessions {
    client: Client,
    bucket: String,
    key: String,
    content_type: String,
    acl: ObjectCannedAcl,
    sse: bool,
}

impl S3Sessions {
    pub async fn connect(config: &Config, access_key: String, secret_key: String) -> Self {
        let creds = Credentials::new(access_key, secret_key, None, None, "env");
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(SharedCredentialsProvider::new(creds))
            .load()
            .await;

        let mut client_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            client_builder = client_builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(client_builder.build()),
            bucket: config.bucket.clone(),
            key: config.key.clone(),
            content_type: config.content_type.clone(),
            acl: ObjectCannedAcl::from(config.acl.as_str()),
            sse: config.sse,
        }
    }
}

fn service_error<E>(err: SdkError<E>) -> anyhow::Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match err.as_service_error() {
        Some(service) => anyhow!(
            "{}: {}",
            service.code().unwrap_or("Unknown"),
            service.message().unwrap_or("no message")
        ),
        None => anyhow!(err.to_string()),
    }
}

#[async_trait]
impl SessionStore for S3Sessions {
    async fn create(&self) -> Result<String> {
        let mut request = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .content_type(&self.content_type)
            .acl(self.acl.clone());
        if self.sse {
            request = request.server_side_encryption(ServerSideEncryption::Aes256);
        }

        let output = request.send().await.map_err(service_error)?;
        output
            .upload_id()
            .map(str::to_string)
            .context("create multipart upload returned no upload id")
    }

    async fn upload_part(
        &self,
        upload_id: &str,
        part_number: i32,
        staged: &Path,
    ) -> Result<PartDescriptor> {
        let size = tokio::fs::metadata(staged)
            .await
            .with_context(|| format!("error getting input file info: {}", staged.display()))?
            .len();
        let body = ByteStream::from_path(staged)
            .await
            .with_context(|| format!("error opening input file: {}", staged.display()))?;

        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(body)
            .send()
            .await
            .map_err(service_error)?;

        let etag = output
            .e_tag()
            .context("upload part returned no etag")?
            .to_string();

        Ok(PartDescriptor {
            part_number,
            etag,
            size,
        })
    }

    async fn complete(&self, upload_id: &str, parts: &[PartDescriptor]) -> Result<()> {
        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|part| {
                CompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(&part.etag)
                    .build()
            })
            .collect();
        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(service_error)?;
        Ok(())
    }

    async fn abort(&self, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(service_error)?;
        Ok(())
    }
}
