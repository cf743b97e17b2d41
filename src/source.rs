//! Retrieval and decoding of source documents.
//!
//! A fetcher does one request per call and keeps no state between calls.
//! Retrying is the refresh loop's business.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{ChannelError, Result};
use crate::models::SourceDocument;

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch `url` and decode it for subscription `key`.
    async fn fetch(&self, url: &str, key: &str) -> Result<SourceDocument>;
}

/// Fetches `http://` and `https://` URLs with reqwest and reads anything
/// else as a local file path. Both are bounded by the same timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("channel-server/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, timeout })
    }

    async fn fetch_remote(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.fetch_error(url, e))?;

        response.text().await.map_err(|e| self.fetch_error(url, e))
    }

    async fn read_local(&self, path: &str) -> Result<String> {
        match tokio::time::timeout(self.timeout, tokio::fs::read_to_string(path)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(ChannelError::Fetch {
                url: path.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(self.timed_out(path)),
        }
    }

    fn fetch_error(&self, url: &str, e: reqwest::Error) -> ChannelError {
        if e.is_timeout() {
            return self.timed_out(url);
        }
        ChannelError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        }
    }

    fn timed_out(&self, url: &str) -> ChannelError {
        ChannelError::Fetch {
            url: url.to_string(),
            message: format!("timed out after {:?}", self.timeout),
        }
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, key: &str) -> Result<SourceDocument> {
        let text = if is_remote(url) {
            self.fetch_remote(url).await?
        } else {
            self.read_local(url).await?
        };

        SourceDocument::parse(&text, key).map_err(|e| ChannelError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn recognises_remote_urls() {
        assert!(is_remote("https://releases.example.com/channels.yaml"));
        assert!(is_remote("http://localhost:8080/channels.yaml"));
        assert!(!is_remote("channels.yaml"));
        assert!(!is_remote("/etc/channels/channels.yaml"));
    }

    #[tokio::test]
    async fn reads_local_documents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "channels:\n  - name: stable\n    latest: 1.0.0\nreleases:\n  - version: 1.0.0"
        )
        .unwrap();

        let doc = fetcher()
            .fetch(file.path().to_str().unwrap(), "stable")
            .await
            .unwrap();
        assert_eq!(doc.channels[0].name, "stable");
        assert_eq!(doc.releases[0].version, "1.0.0");
    }

    #[tokio::test]
    async fn missing_file_is_a_fetch_error() {
        let err = fetcher()
            .fetch("/nonexistent/channels.yaml", "stable")
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Fetch { .. }));
    }

    #[tokio::test]
    async fn malformed_yaml_is_a_decode_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "channels: [oops").unwrap();

        let err = fetcher()
            .fetch(file.path().to_str().unwrap(), "stable")
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Decode { .. }));
    }
}
