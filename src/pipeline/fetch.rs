//! Image fetcher: GET one URL and leave exactly one file at the destination.
//!
//! Bodies are streamed to a sibling `.part` file and renamed into place only
//! once complete, so a failed fetch never leaves a file at the destination
//! path. URLs ending in `.pdf` are downloaded to a temp file and their first
//! page is rasterised instead of being written verbatim.

use crate::error::FetchError;
use crate::pipeline::render;
use futures::StreamExt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// How an artifact reached the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchedArtifact {
    /// Payload written as-is.
    Raw { bytes: u64 },
    /// First page of a PDF payload, rasterised.
    PdfPage,
}

/// Anything that can materialise a URL at a local path.
///
/// The batch driver only calls this for destinations that do not exist yet.
pub trait ArtifactFetcher: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
    ) -> impl Future<Output = Result<FetchedArtifact, FetchError>> + Send;
}

/// Check if the URL path ends in `.pdf` (case-insensitive, query ignored).
pub fn is_pdf_url(url: &str) -> bool {
    url_path_extension(url).as_deref() == Some("pdf")
}

/// Lower-cased extension of the last path segment, query and fragment ignored.
///
/// Only short alphanumeric extensions count: `a.jpg?x=1` → `jpg`,
/// `a.tar.gz` → `gz`, `v1.2/file` → `None`.
pub fn url_path_extension(url: &str) -> Option<String> {
    let path = match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    };
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 5 {
        return None;
    }
    ext.chars()
        .all(|c| c.is_ascii_alphanumeric())
        .then(|| ext.to_ascii_lowercase())
}

/// reqwest-backed fetcher with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
    max_rendered_pixels: u32,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64, max_rendered_pixels: u32) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FetchError::Network {
                url: String::new(),
                reason: format!("HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            timeout_secs,
            max_rendered_pixels,
        })
    }

    fn request_error(&self, url: &str, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }

    /// Stream the response body of `url` into `path`.
    async fn download_to(&self, url: &str, path: &Path) -> Result<u64, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let io_err = |e: std::io::Error| FetchError::Io {
            path: path.to_path_buf(),
            detail: e.to_string(),
        };

        let mut file = tokio::fs::File::create(path).await.map_err(io_err)?;
        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| self.request_error(url, e))?;
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;
        Ok(written)
    }

    async fn fetch_raw(&self, url: &str, dest: &Path) -> Result<FetchedArtifact, FetchError> {
        let part = part_path(dest);
        let bytes = match self.download_to(url, &part).await {
            Ok(bytes) => bytes,
            Err(e) => {
                remove_quietly(&part).await;
                return Err(e);
            }
        };
        commit(&part, dest).await?;
        Ok(FetchedArtifact::Raw { bytes })
    }

    async fn fetch_pdf(&self, url: &str, dest: &Path) -> Result<FetchedArtifact, FetchError> {
        // pdfium opens documents by path; the temp file goes away on drop.
        let temp = tempfile::Builder::new()
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| FetchError::Io {
                path: std::env::temp_dir(),
                detail: e.to_string(),
            })?;
        let bytes = self.download_to(url, temp.path()).await?;
        debug!("Downloaded {} bytes of PDF from {}", bytes, url);

        let part = part_path(dest);
        if let Err(e) = render::rasterise_first_page(temp.path(), &part, self.max_rendered_pixels).await {
            remove_quietly(&part).await;
            return Err(e.with_url(url));
        }
        commit(&part, dest).await?;
        Ok(FetchedArtifact::PdfPage)
    }
}

impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<FetchedArtifact, FetchError> {
        info!("Downloading: {}", url);
        if is_pdf_url(url) {
            self.fetch_pdf(url, dest).await
        } else {
            self.fetch_raw(url, dest).await
        }
    }
}

/// `dir/name.jpeg` → `dir/name.jpeg.part`.
fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

async fn commit(part: &Path, dest: &Path) -> Result<(), FetchError> {
    if let Err(e) = tokio::fs::rename(part, dest).await {
        remove_quietly(part).await;
        return Err(FetchError::Io {
            path: dest.to_path_buf(),
            detail: e.to_string(),
        });
    }
    Ok(())
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!("Could not remove {}: {}", path.display(), e);
        }
    }
}
