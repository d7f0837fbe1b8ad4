//! HTTP page fetching for `/browse`

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

use devins_compiler::{CancellationToken, CapabilityError, CapabilityResult, WebCrawler};

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static BLANK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\r\f]+").unwrap());

/// [`WebCrawler`] backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpCrawler {
    client: reqwest::Client,
}

impl HttpCrawler {
    /// Crawler whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> CapabilityResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("devins/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CapabilityError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<String, reqwest::Error> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

#[async_trait]
impl WebCrawler for HttpCrawler {
    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> CapabilityResult<String> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CapabilityError::Network {
                url: url.to_string(),
                message: "only http and https URLs are supported".to_string(),
            });
        }
        tracing::info!(url, "fetching page");

        let body = tokio::select! {
            body = self.get(url) => body.map_err(|e| CapabilityError::Network {
                url: url.to_string(),
                message: e.to_string(),
            })?,
            _ = cancel.cancelled() => return Err(CapabilityError::Cancelled),
        };
        Ok(html_to_text(&body))
    }
}

/// Strip markup and collapse whitespace
pub fn html_to_text(html: &str) -> String {
    let without_scripts = SCRIPT_RE.replace_all(html, "");
    let text = TAG_RE.replace_all(&without_scripts, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    text.lines()
        .map(|line| BLANK_RE.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text() {
        let html = "<html><head><style>p{}</style><script>var a = 1;</script></head>\n<body><h1>Title</h1>\n<p>Fish &amp; chips</p>\n\n</body></html>";
        assert_eq!(html_to_text(html), "Title\nFish & chips");
    }

    #[tokio::test]
    async fn test_rejects_other_schemes() {
        let crawler = HttpCrawler::new(Duration::from_secs(1)).unwrap();
        let err = crawler
            .fetch("file:///etc/passwd", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Network { .. }));
    }
}
