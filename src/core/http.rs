use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, RANGE};
use reqwest::Client;

use crate::core::config::SyncSettings;
use crate::core::error::{SyncError, SyncResult};

pub const APP_USER_AGENT: &str = "WW-Manager/2.0";

/// Streamed response body handed to the downloader.
pub type ByteStream = BoxStream<'static, SyncResult<Bytes>>;

/// An opened transfer: HTTP status plus the body stream.
pub struct TransferResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl TransferResponse {
    /// `206 Partial Content`, i.e. the server honoured the range request.
    pub fn is_partial(&self) -> bool {
        self.status == 206
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network seam used by the manifest resolver and the downloader.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch a whole (possibly gzip-encoded) document.
    async fn get_bytes(&self, url: &str) -> SyncResult<Vec<u8>>;

    /// Open a transfer, asking for `bytes=<offset>-` when `offset > 0`.
    async fn open(&self, url: &str, offset: u64) -> SyncResult<TransferResponse>;
}

/// Client used for manifest documents: gzip is negotiated and decoded
/// transparently.
pub fn build_manifest_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(APP_USER_AGENT)
        .gzip(true)
        .timeout(timeout)
        .build()
}

/// Client used for file transfers. Content is requested as-is so byte
/// counts line up with manifest sizes and range offsets.
pub fn build_transfer_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .no_gzip()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
}

/// `reqwest`-backed transport.
pub struct HttpTransport {
    manifest_client: Client,
    transfer_client: Client,
}

impl HttpTransport {
    pub fn new(settings: &SyncSettings) -> SyncResult<Self> {
        Ok(Self {
            manifest_client: build_manifest_client(settings.manifest_timeout())?,
            transfer_client: build_transfer_client(settings.transfer_timeout())?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_bytes(&self, url: &str) -> SyncResult<Vec<u8>> {
        let response = self.manifest_client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn open(&self, url: &str, offset: u64) -> SyncResult<TransferResponse> {
        let mut req = self.transfer_client.get(url);
        if offset > 0 {
            req = req.header(RANGE, format!("bytes={offset}-"));
        }
        let response = req.send().await?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(SyncError::from))
            .boxed();
        Ok(TransferResponse { status, body })
    }
}
