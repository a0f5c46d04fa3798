//! Publishing artifacts to S3.

use anyhow::{Context, Result};
use aws_sdk_s3::primitives::ByteStream;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Object key for an artifact: `period=<YYYY-MM>/<file name>[.gz]`.
pub fn artifact_key(period: &str, path: &Path, gzip: bool) -> Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("artifact path has no file name: {}", path.display()))?;
    let suffix = if gzip { ".gz" } else { "" };
    Ok(format!("period={period}/{name}{suffix}"))
}

pub fn gzip_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Uploads local artifact files, optionally gzip-compressed.
#[tracing::instrument(skip(client, paths))]
pub async fn upload_artifacts(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    period: &str,
    paths: &[&str],
    gzip: bool,
) -> Result<usize> {
    let mut upload_count = 0;

    for path in paths {
        let path = Path::new(path);
        let contents =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let body = if gzip { gzip_bytes(&contents)? } else { contents };
        let key = artifact_key(period, path, gzip)?;

        client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("failed to upload s3://{bucket}/{key}"))?;

        upload_count += 1;
    }

    info!(upload_count, "S3 upload complete");
    Ok(upload_count)
}

/// Serializes a value to JSON and uploads it with `application/json` content type.
pub async fn write_json_to_s3(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    value: &impl Serialize,
) -> Result<()> {
    let body = serde_json::to_vec(value)?;

    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .body(body.into())
        .content_type("application/json")
        .send()
        .await?;

    Ok(())
}
