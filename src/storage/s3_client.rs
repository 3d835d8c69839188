//! S3-compatible storage client
//!
//! Wraps the AWS SDK for S3-compatible storage access. Every data-plane call
//! except abort carries the SSE-C encryption context.

use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client,
};
use bytes::Bytes;

use crate::config::{CredentialMode, StorageConfig};
use crate::encryption::EncryptionContext;
use crate::error::StoreError;

use super::store::ObjectStore;
use super::types::{CompletedUpload, ObjectBody, PartRecord, UploadTarget};

/// S3-compatible storage client
#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    /// Create a new S3 client from configuration
    pub async fn new(config: &StorageConfig) -> Self {
        let loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        let loader = match &config.credentials {
            CredentialMode::Static {
                access_key,
                secret_key,
            } => loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "ssec-gateway",
            )),
            CredentialMode::InstanceRole => {
                let imds = aws_config::imds::Client::builder()
                    .connect_timeout(config.credential_timeout)
                    .read_timeout(config.credential_timeout)
                    .build();
                loader.credentials_provider(
                    aws_config::imds::credentials::ImdsCredentialsProvider::builder()
                        .imds_client(imds)
                        .build(),
                )
            }
        };

        let sdk_config = loader.load().await;

        let mut s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint {
            s3_config = s3_config.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(s3_config.build()),
        }
    }

    /// Wrap an already configured SDK client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3Store {
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        ctx: &EncryptionContext,
    ) -> Result<String, StoreError> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .sse_customer_algorithm(ctx.algorithm_header())
            .sse_customer_key(ctx.key_header())
            .sse_customer_key_md5(ctx.key_digest_header())
            .send()
            .await
            .map_err(|e| classify("CreateMultipartUpload", e))?;

        response
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| StoreError::Rejected {
                op: "CreateMultipartUpload",
                status: None,
                code: "MissingUploadId".to_string(),
                message: "response carried no upload id".to_string(),
            })
    }

    async fn upload_part(
        &self,
        target: &UploadTarget,
        part_number: i32,
        body: Bytes,
        ctx: &EncryptionContext,
    ) -> Result<PartRecord, StoreError> {
        let size_bytes = body.len() as u64;

        let response = self
            .client
            .upload_part()
            .bucket(&target.bucket)
            .key(&target.key)
            .upload_id(&target.upload_id)
            .part_number(part_number)
            .content_length(size_bytes as i64)
            .body(ByteStream::from(body))
            .sse_customer_algorithm(ctx.algorithm_header())
            .sse_customer_key(ctx.key_header())
            .sse_customer_key_md5(ctx.key_digest_header())
            .send()
            .await
            .map_err(|e| classify("UploadPart", e))?;

        let e_tag = response.e_tag().ok_or_else(|| StoreError::Rejected {
            op: "UploadPart",
            status: None,
            code: "MissingETag".to_string(),
            message: format!("part {} acknowledged without an ETag", part_number),
        })?;

        Ok(PartRecord {
            part_number,
            e_tag: e_tag.to_string(),
            size_bytes,
        })
    }

    async fn complete_multipart_upload(
        &self,
        target: &UploadTarget,
        parts: &[PartRecord],
        ctx: &EncryptionContext,
    ) -> Result<CompletedUpload, StoreError> {
        let completed_parts: Vec<CompletedPart> = parts
            .iter()
            .map(|part| {
                CompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(&part.e_tag)
                    .build()
            })
            .collect();

        let response = self
            .client
            .complete_multipart_upload()
            .bucket(&target.bucket)
            .key(&target.key)
            .upload_id(&target.upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .sse_customer_algorithm(ctx.algorithm_header())
            .sse_customer_key(ctx.key_header())
            .sse_customer_key_md5(ctx.key_digest_header())
            .send()
            .await
            .map_err(|e| classify("CompleteMultipartUpload", e))?;

        Ok(CompletedUpload {
            e_tag: response.e_tag().map(|s| s.to_string()),
            location: response.location().map(|s| s.to_string()),
        })
    }

    async fn abort_multipart_upload(&self, target: &UploadTarget) -> Result<(), StoreError> {
        self.client
            .abort_multipart_upload()
            .bucket(&target.bucket)
            .key(&target.key)
            .upload_id(&target.upload_id)
            .send()
            .await
            .map_err(|e| classify("AbortMultipartUpload", e))?;
        Ok(())
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        ctx: &EncryptionContext,
    ) -> Result<ObjectBody, StoreError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .sse_customer_algorithm(ctx.algorithm_header())
            .sse_customer_key(ctx.key_header())
            .sse_customer_key_md5(ctx.key_digest_header())
            .send()
            .await
            .map_err(|e| match classify("GetObject", e) {
                StoreError::Rejected { status, code, .. }
                    if is_missing_or_wrong_key(status, &code) =>
                {
                    StoreError::NotFound(key.to_string())
                }
                other => other,
            })?;

        let content_length = response
            .content_length()
            .and_then(|len| u64::try_from(len).ok());
        let content_type = response.content_type().map(|s| s.to_string());
        let e_tag = response.e_tag().map(|s| s.to_string());

        Ok(ObjectBody {
            content_length,
            content_type,
            e_tag,
            reader: Box::new(Box::pin(response.body.into_async_read())),
        })
    }

    async fn head_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify("HeadBucket", e))?;
        Ok(())
    }
}

/// Split SDK failures into store rejections and transport failures
fn classify<E>(op: &'static str, err: SdkError<E>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::ServiceError(service) => StoreError::Rejected {
            op,
            status: Some(service.raw().status().as_u16()),
            code: service.err().code().unwrap_or("Unknown").to_string(),
            message: service
                .err()
                .message()
                .map(|s| s.to_string())
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string()),
        },
        _ => StoreError::Transport {
            op,
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}

/// Statuses S3 uses for a missing object or a customer key that does not open it
fn is_missing_or_wrong_key(status: Option<u16>, code: &str) -> bool {
    matches!(status, Some(403) | Some(404))
        || matches!(code, "NoSuchKey" | "AccessDenied" | "InvalidRequest")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_or_wrong_key_statuses() {
        assert!(is_missing_or_wrong_key(Some(404), "NoSuchKey"));
        assert!(is_missing_or_wrong_key(Some(403), "AccessDenied"));
        assert!(is_missing_or_wrong_key(Some(400), "InvalidRequest"));
        assert!(!is_missing_or_wrong_key(Some(500), "InternalError"));
        assert!(!is_missing_or_wrong_key(Some(503), "SlowDown"));
    }
}
