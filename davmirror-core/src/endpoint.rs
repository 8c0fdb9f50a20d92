use crate::{DavError, Location, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    Body, Client, StatusCode, Url,
    header::{self, HeaderMap},
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::io::ReaderStream;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Content handed to a PUT.
#[derive(Debug, Clone)]
pub enum UploadSource {
    Memory(Bytes),
    /// Streamed from disk on every upload, never buffered whole.
    File(PathBuf),
}

impl UploadSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        UploadSource::File(path.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            UploadSource::Memory(_) => "memory",
            UploadSource::File(_) => "temporary file",
        }
    }

    /// Fails early when a file source cannot be read.
    pub async fn ensure_readable(&self) -> Result<()> {
        if let UploadSource::File(path) = self {
            let meta = tokio::fs::metadata(path).await?;
            if !meta.is_file() {
                return Err(DavError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("upload source is not a regular file: {}", path.display()),
                )));
            }
        }
        Ok(())
    }
}

impl From<Bytes> for UploadSource {
    fn from(bytes: Bytes) -> Self {
        UploadSource::Memory(bytes)
    }
}

impl From<Vec<u8>> for UploadSource {
    fn from(bytes: Vec<u8>) -> Self {
        UploadSource::Memory(Bytes::from(bytes))
    }
}

impl From<&'static str> for UploadSource {
    fn from(text: &'static str) -> Self {
        UploadSource::Memory(Bytes::from_static(text.as_bytes()))
    }
}

#[derive(Debug, Clone)]
pub struct EndpointResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl EndpointResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
    }
}

/// One HTTP verb against `location` joined with `name`.
///
/// A completed exchange is `Ok` whatever its status; `Err` means the call
/// itself did not complete.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn head(&self, location: &Location, name: &str) -> Result<EndpointResponse>;

    async fn get(&self, location: &Location, name: &str) -> Result<EndpointResponse>;

    async fn put(&self, location: &Location, name: &str, source: &UploadSource)
    -> Result<StatusCode>;

    async fn delete(&self, location: &Location, name: &str) -> Result<StatusCode>;
}

#[derive(Clone)]
pub struct HttpEndpoint {
    client: Client,
}

impl HttpEndpoint {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| DavError::Config(format!("failed to build http client: {}", error)))?;

        Ok(Self { client })
    }

    async fn file_body(&self, path: &Path) -> Result<(Body, u64)> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        Ok((Body::wrap_stream(ReaderStream::new(file)), size))
    }
}

#[async_trait]
impl Endpoint for HttpEndpoint {
    async fn head(&self, location: &Location, name: &str) -> Result<EndpointResponse> {
        let url = location.join(name)?;
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|error| transport_error(&url, error))?;

        Ok(EndpointResponse {
            status: response.status(),
            headers: response.headers().clone(),
            body: Bytes::new(),
        })
    }

    async fn get(&self, location: &Location, name: &str) -> Result<EndpointResponse> {
        let url = location.join(name)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|error| transport_error(&url, error))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|error| transport_error(&url, error))?;

        Ok(EndpointResponse {
            status,
            headers,
            body,
        })
    }

    async fn put(
        &self,
        location: &Location,
        name: &str,
        source: &UploadSource,
    ) -> Result<StatusCode> {
        let url = location.join(name)?;
        let request = match source {
            UploadSource::Memory(bytes) => self.client.put(url.clone()).body(bytes.clone()),
            UploadSource::File(path) => {
                let (body, size) = self.file_body(path).await?;
                self.client
                    .put(url.clone())
                    .header(header::CONTENT_LENGTH, size.to_string())
                    .body(body)
            }
        };

        let response = request
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .send()
            .await
            .map_err(|error| transport_error(&url, error))?;

        Ok(response.status())
    }

    async fn delete(&self, location: &Location, name: &str) -> Result<StatusCode> {
        let url = location.join(name)?;
        let response = self
            .client
            .delete(url.clone())
            .send()
            .await
            .map_err(|error| transport_error(&url, error))?;

        Ok(response.status())
    }
}

fn transport_error(url: &Url, error: reqwest::Error) -> DavError {
    let message = if error.is_timeout() {
        format!("timed out: {}", error)
    } else {
        error.to_string()
    };

    DavError::Transport {
        url: url.to_string(),
        message,
    }
}
