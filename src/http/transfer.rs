//! Streaming download and multipart upload

use futures::StreamExt;
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use std::path::Path;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::ReaderStream;

use super::{check_http_response, default_client};
use crate::common::progress::bytes_bar;
use crate::common::{Result, UtilError};

const UPLOAD_CHUNK: usize = 64 * 1024;

/// Stream `url` into `path`, creating parent directories
///
/// `chunk_size` sizes the write buffer. Returns the number of bytes written.
pub async fn download(url: &str, path: &Path, chunk_size: usize, progress: bool) -> Result<u64> {
    debug!("GET {} -> {}", url, path.display());
    let response = check_http_response(default_client()?.get(url).send().await?).await?;
    let total = response.content_length().unwrap_or(0);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = BufWriter::with_capacity(chunk_size.max(1), File::create(path).await?);
    let bar = bytes_bar(total, "Downloading", progress);

    let mut written = 0u64;
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        bar.inc(chunk.len() as u64);
    }
    file.flush().await?;
    bar.finish_and_clear();

    Ok(written)
}

/// POST `path` as a multipart form with a single file field
///
/// The field is named `field_name` and carries the file name. The response
/// is returned unchecked.
pub async fn upload_multipart(
    url: &str,
    path: &Path,
    field_name: &str,
    progress: bool,
    client: Option<&Client>,
) -> Result<Response> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| UtilError::InvalidInput(format!("Not a file path: {}", path.display())))?
        .to_string();
    let file = File::open(path).await?;
    let size = file.metadata().await?.len();

    let bar = bytes_bar(size, "Uploading", progress);
    let counter = bar.clone();
    let chunks = ReaderStream::with_capacity(file, UPLOAD_CHUNK).inspect(move |chunk| {
        if let Ok(chunk) = chunk {
            counter.inc(chunk.len() as u64);
        }
    });
    let body = Body::wrap_stream(chunks);

    let part = Part::stream_with_length(body, size).file_name(file_name);
    let form = Form::new().part(field_name.to_string(), part);

    let client = match client {
        Some(client) => client.clone(),
        None => default_client()?,
    };
    debug!("POST {} <- {}", url, path.display());
    let response = client.post(url).multipart(form).send().await?;
    bar.finish_and_clear();

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::super::testing::{serve_canned, serve_recording};
    use super::*;

    #[tokio::test]
    async fn test_download_creates_parents() {
        let payload = vec![7u8; 10_000];
        let addr = serve_canned("200 OK", "application/octet-stream", &payload, 1);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/blob.bin");

        let written = download(&format!("http://{}/blob", addr), &path, 1024, false)
            .await
            .unwrap();
        assert_eq!(written, payload.len() as u64);
        assert_eq!(std::fs::read(&path).unwrap(), payload);
    }

    #[tokio::test]
    async fn test_download_error_status() {
        let addr = serve_canned("404 Not Found", "text/plain", b"", 1);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.bin");

        assert!(download(&format!("http://{}/", addr), &path, 1024, false).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_upload_multipart() {
        let (addr, requests) = serve_recording("200 OK", "text/plain", b"stored", 1);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        let contents = vec![b'r'; UPLOAD_CHUNK * 2 + 17];
        std::fs::write(&path, &contents).unwrap();

        let response = upload_multipart(&format!("http://{}/upload", addr), &path, "file", false, None)
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        let request = requests.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        let text = String::from_utf8_lossy(&request);
        assert!(text.starts_with("POST /upload "));
        assert!(text.to_ascii_lowercase().contains("multipart/form-data; boundary="));
        assert!(text.contains(r#"name="file""#));
        assert!(text.contains(r#"filename="report.txt""#));
        assert!(text.contains(std::str::from_utf8(&contents).unwrap()));
    }
}
