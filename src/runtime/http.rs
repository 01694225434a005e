//! HTTP page source.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use crate::config::ThreadConfig;
use crate::error::{Error, Result};
use crate::extract::PageDocument;
use crate::fetch::{page_from_url, PageSource, Url};
use crate::threading::ThreadId;

/// Fetches pages from `<base_url>/<thread>?<param>=<page>`.
///
/// # Example
///
/// ```no_run
/// use floortree::runtime::HttpPageSource;
/// use floortree::fetch::PageSource;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = HttpPageSource::new("https://forum.example.com/t")?;
/// let (thread, page) = source.locate("https://forum.example.com/t/12345?p=2")?;
/// let document = source.fetch_page(&thread, page).await?;
/// println!("{} bytes", document.body.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: reqwest::Client,
    base_url: Url,
    page_param: String,
}

impl HttpPageSource {
    /// Create a source for threads under `base_url`.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::from_config(base_url, &ThreadConfig::default())
    }

    /// Create a source using the page parameter from `config`.
    pub fn from_config(base_url: &str, config: &ThreadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .user_agent(concat!("floortree/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Self::with_client(client, base_url, &config.page_query_param)
    }

    /// Create a source around an existing client.
    pub fn with_client(client: reqwest::Client, base_url: &str, page_param: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| Error::InvalidConfig(format!("invalid base URL {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!(
                "base URL {base_url} cannot hold a thread path"
            )));
        }
        base_url.set_query(None);
        base_url.set_fragment(None);

        Ok(Self {
            client,
            base_url,
            page_param: page_param.to_string(),
        })
    }

    /// URL of `page` of `thread`. The thread id is percent-encoded as one
    /// path segment.
    pub fn page_url(&self, thread: &ThreadId, page: u32) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(thread.as_str());
        }
        url.query_pairs_mut()
            .append_pair(&self.page_param, &page.to_string());
        url
    }

    /// Thread id and page number named by a thread page URL.
    ///
    /// `url` may be relative to the base URL. The thread id is the last
    /// path segment, as it appears in the URL.
    pub fn locate(&self, url: &str) -> Result<(ThreadId, u32)> {
        let parsed = self
            .base_url
            .join(url)
            .map_err(|e| Error::InvalidConfig(format!("invalid thread URL {url:?}: {e}")))?;
        let thread = parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .ok_or_else(|| Error::InvalidConfig(format!("no thread id in {url:?}")))?;

        Ok((
            ThreadId::new(thread),
            page_from_url(&parsed, &self.page_param),
        ))
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, thread: &ThreadId, page: u32) -> Result<PageDocument> {
        let url = self.page_url(thread, page);
        log::debug!("GET {url}");

        let response = self.client.get(url).send().await.map_err(|e| Error::Fetch {
            page,
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http {
                page,
                status: status.as_u16(),
            });
        }

        let charset = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(charset_from_content_type);

        let body = response.bytes().await.map_err(|e| Error::Fetch {
            page,
            reason: e.to_string(),
        })?;

        let document = PageDocument::new(page, body);
        Ok(match charset {
            Some(charset) => document.with_charset(charset),
            None => document,
        })
    }
}

/// `charset` parameter of a `Content-Type` header value.
fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|charset| !charset.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url() {
        let source = HttpPageSource::new("https://forum.example.com/t/").unwrap();
        assert_eq!(
            source.page_url(&ThreadId::from("42"), 3).as_str(),
            "https://forum.example.com/t/42?p=3"
        );

        let config = ThreadConfig {
            page_query_param: "page".to_string(),
            ..ThreadConfig::default()
        };
        let source = HttpPageSource::from_config("https://x.test/thread?old=1", &config).unwrap();
        assert_eq!(
            source.page_url(&ThreadId::from("7"), 1).as_str(),
            "https://x.test/thread/7?page=1"
        );
    }

    #[test]
    fn test_page_url_encodes_thread_id() {
        let source = HttpPageSource::new("https://x.test/t").unwrap();
        assert_eq!(
            source.page_url(&ThreadId::from("a b/c?d"), 2).as_str(),
            "https://x.test/t/a%20b%2Fc%3Fd?p=2"
        );
    }

    #[test]
    fn test_locate() {
        let source = HttpPageSource::new("https://x.test/t").unwrap();
        assert_eq!(
            source.locate("https://x.test/t/12345?p=4#r_9").unwrap(),
            (ThreadId::from("12345"), 4)
        );
        assert_eq!(
            source.locate("/t/678").unwrap(),
            (ThreadId::from("678"), 1)
        );
        assert_eq!(
            source.locate("/t/678/?p=x").unwrap(),
            (ThreadId::from("678"), 1)
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpPageSource::new("not a url"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            HttpPageSource::new("mailto:someone@example.com"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_charset_from_content_type() {
        assert_eq!(
            charset_from_content_type("text/html; charset=GBK").as_deref(),
            Some("GBK")
        );
        assert_eq!(
            charset_from_content_type(r#"text/html;Charset="utf-8""#).as_deref(),
            Some("utf-8")
        );
        assert_eq!(charset_from_content_type("text/html"), None);
        assert_eq!(charset_from_content_type("text/html; charset="), None);
    }
}
