use crate::error::{RenderError, Result};
use crate::ports::fetch::RemoteFetcher;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::{fs::File, io::AsyncWriteExt, io::BufWriter};
use tokio_util::io::StreamReader;

/// Network fetches over HTTP(S).
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RenderError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RenderError::asset(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::asset(url, format!("HTTP {}", status)));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        stream_to_file(dest, response.bytes_stream())
            .await
            .map_err(|e| RenderError::asset(url, e))
    }
}

/// Save a `Stream` of byte chunks to a file, returning the bytes written
pub(crate) async fn stream_to_file<S, B, E>(path: &Path, stream: S) -> io::Result<u64>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: bytes::Buf,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body_with_io_error = stream.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
    let body_reader = StreamReader::new(body_with_io_error);
    futures::pin_mut!(body_reader);

    let mut file = BufWriter::new(File::create(path).await?);
    let written = tokio::io::copy(&mut body_reader, &mut file).await?;
    file.flush().await?;

    Ok(written)
}
