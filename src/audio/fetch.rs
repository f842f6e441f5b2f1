// Remote byte fetching. One call per remote load, the whole body lands in the
// staging writer before the engine ever sees the file.

use super::error::{PlayerError, PlayerResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ORIGIN, REFERER, USER_AGENT};
use reqwest::Url;
use std::io::Write;
use tracing::{debug, info};

/// Request headers sent with every download.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub user_agent: String,
    pub referer: Option<String>,
    pub origin: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("tapedeck/", env!("CARGO_PKG_VERSION")).to_string(),
            referer: None,
            origin: None,
        }
    }
}

/// Streams every byte of a resource into `sink`. Returns the number of bytes written.
///
/// Implementations don't enforce the overall timeout themselves - the controller
/// wraps the call in one.
#[async_trait]
pub trait ByteFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, sink: &mut (dyn Write + Send)) -> PlayerResult<u64>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> PlayerResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        if let Some(referer) = &config.referer {
            headers.insert(REFERER, header_value(referer)?);
        }
        if let Some(origin) = &config.origin {
            headers.insert(ORIGIN, header_value(origin)?);
        }
        headers.insert(USER_AGENT, header_value(&config.user_agent)?);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| PlayerError::Output(format!("http client: {}", e)))?;

        Ok(Self { client })
    }
}

fn header_value(raw: &str) -> PlayerResult<HeaderValue> {
    HeaderValue::from_str(raw)
        .map_err(|e| PlayerError::Output(format!("invalid header value {:?}: {}", raw, e)))
}

#[async_trait]
impl ByteFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, sink: &mut (dyn Write + Send)) -> PlayerResult<u64> {
        debug!("GET {}", url);
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| PlayerError::fetch_failed(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlayerError::fetch_failed(url.as_str(), format!("HTTP {}", status)));
        }

        let mut total = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| PlayerError::fetch_failed(url.as_str(), e))?
        {
            sink.write_all(&chunk)?;
            total += chunk.len() as u64;
        }

        info!("Fetched {} bytes from {}", total, url);
        Ok(total)
    }
}
