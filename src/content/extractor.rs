//! Source content extraction
//!
//! Normalizes heterogeneous source material into [`ExtractedContent`]:
//! web pages are fetched and stripped down to their main text, PDF and
//! plain-text files are read from disk, and pasted text passes through
//! cleanup only. Every successful extraction carries a content hash so
//! downstream layers can recognize material they have already seen.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::debug;

use crate::models::content_hash;
use crate::utils::{extract_domain, normalize_whitespace};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// ============================================================
// Types
// ============================================================

/// Where source material comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceInput {
    /// A web page to fetch and strip
    Url(String),
    /// Pasted or piped text
    RawText(String),
    /// A local file (.pdf, .txt, .md)
    Document(PathBuf),
}

impl SourceInput {
    /// Classify a CLI argument into a source input
    pub fn from_arg(arg: &str) -> Self {
        if arg.starts_with("http://") || arg.starts_with("https://") {
            Self::Url(arg.to_string())
        } else if std::path::Path::new(arg).exists() {
            Self::Document(PathBuf::from(arg))
        } else {
            Self::RawText(arg.to_string())
        }
    }

    /// Identifier used for dedup lookups and reporting
    pub fn identifier(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::RawText(_) => "pasted_text".to_string(),
            Self::Document(path) => path.display().to_string(),
        }
    }
}

/// Extraction failure
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("could not reach source {source_id}: {reason}")]
    UnreachableSource { source_id: String, reason: String },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("source {0} yielded no usable text")]
    EmptyContent(String),
}

pub type ExtractResult<T> = Result<T, ExtractError>;

/// Normalized source material
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    /// Identifier of the source (URL, file path, or "pasted_text")
    pub source: String,
    pub title: Option<String>,
    /// Cleaned body text
    pub text: String,
    /// Hex SHA-256 of the cleaned text
    pub content_hash: String,
    pub extracted_at: DateTime<Utc>,
}

impl ExtractedContent {
    fn new(
        source: String,
        title: Option<String>,
        text: String,
        extracted_at: DateTime<Utc>,
    ) -> ExtractResult<Self> {
        let text = normalize_whitespace(&text);
        if text.is_empty() {
            return Err(ExtractError::EmptyContent(source));
        }

        let content_hash = content_hash(&text);
        Ok(Self {
            source,
            title,
            text,
            content_hash,
            extracted_at,
        })
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

// ============================================================
// Contract
// ============================================================

/// Something that can turn a source input into normalized content
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, input: &SourceInput) -> ExtractResult<ExtractedContent>;
}

// ============================================================
// HTTP-backed extractor
// ============================================================

/// Extractor backed by reqwest for URLs and blocking reads for files
pub struct HttpExtractor {
    client: Client,
}

impl HttpExtractor {
    pub fn new(timeout: std::time::Duration) -> ExtractResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| ExtractError::UnreachableSource {
                source_id: "client".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self { client })
    }

    async fn extract_url(&self, url: &str) -> ExtractResult<ExtractedContent> {
        debug!(url, "fetching source page");

        let response = self.client.get(url).send().await.map_err(|e| {
            ExtractError::UnreachableSource {
                source_id: url.to_string(),
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::UnreachableSource {
                source_id: url.to_string(),
                reason: format!("status {}", status),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| ExtractError::UnreachableSource {
                source_id: url.to_string(),
                reason: e.to_string(),
            })?;

        // scraper's Html is not Send, so parsing happens after the last
        // await point
        let (title, text) = parse_page(&html);
        debug!(url, domain = ?extract_domain(url), "page parsed");

        ExtractedContent::new(url.to_string(), title, text, Utc::now())
    }

    async fn extract_document(&self, path: &PathBuf) -> ExtractResult<ExtractedContent> {
        let identifier = path.display().to_string();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => {
                let path = path.clone();
                let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path))
                    .await
                    .map_err(|e| ExtractError::UnreachableSource {
                        source_id: identifier.clone(),
                        reason: format!("extraction task failed: {}", e),
                    })?
                    .map_err(|e| ExtractError::UnreachableSource {
                        source_id: identifier.clone(),
                        reason: format!("pdf parse failed: {}", e),
                    })?;

                ExtractedContent::new(identifier, None, text, Utc::now())
            }
            "txt" | "md" => {
                let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
                    ExtractError::UnreachableSource {
                        source_id: identifier.clone(),
                        reason: e.to_string(),
                    }
                })?;
                let title = first_nonempty_line(&raw);
                ExtractedContent::new(identifier, title, raw, Utc::now())
            }
            other => Err(ExtractError::UnsupportedFormat(format!(
                ".{} ({})",
                other, identifier
            ))),
        }
    }
}

#[async_trait]
impl ContentExtractor for HttpExtractor {
    async fn extract(&self, input: &SourceInput) -> ExtractResult<ExtractedContent> {
        match input {
            SourceInput::Url(url) => self.extract_url(url).await,
            SourceInput::Document(path) => self.extract_document(path).await,
            SourceInput::RawText(text) => {
                let title = first_nonempty_line(text);
                ExtractedContent::new("pasted_text".to_string(), title, text.clone(), Utc::now())
            }
        }
    }
}

// ============================================================
// HTML parsing
// ============================================================

/// Pull the title and main body text out of a fetched page
fn parse_page(html: &str) -> (Option<String>, String) {
    let document = Html::parse_document(html);

    let title = page_title(&document);

    // prefer semantic containers; fall back to the whole body
    let text = ["main", "article", "body"]
        .iter()
        .filter_map(|tag| Selector::parse(tag).ok())
        .filter_map(|selector| document.select(&selector).next())
        .map(|element| {
            element
                .text()
                .filter(|chunk| !inside_chrome(chunk))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .find(|text| !text.trim().is_empty())
        .unwrap_or_default();

    (title, text)
}

fn page_title(document: &Html) -> Option<String> {
    for css in ["title", "h1", r#"meta[property="og:title"]"#] {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let value = if css.starts_with("meta") {
                element.value().attr("content").map(str::to_string)
            } else {
                Some(element.text().collect::<String>())
            };
            if let Some(title) = value {
                let title = title.trim().to_string();
                if !title.is_empty() {
                    return Some(title);
                }
            }
        }
    }
    None
}

/// Filter obvious script/style payloads that survived text collection
fn inside_chrome(chunk: &str) -> bool {
    let trimmed = chunk.trim_start();
    trimmed.starts_with("function")
        || trimmed.starts_with("var ")
        || trimmed.starts_with("window.")
        || trimmed.starts_with('{') && trimmed.contains(':')
}

fn first_nonempty_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const PAGE: &str = r#"
        <html>
          <head><title>Quarterly Review</title></head>
          <body>
            <nav>Home | About</nav>
            <article>
              <h1>Quarterly Review</h1>
              <p>Revenue grew twelve percent over the last quarter.</p>
              <p>The team shipped three major features.</p>
            </article>
          </body>
        </html>
    "#;

    #[test]
    fn test_parse_page_prefers_article_over_body() {
        let (title, text) = parse_page(PAGE);
        assert_eq!(title.as_deref(), Some("Quarterly Review"));
        assert!(text.contains("Revenue grew twelve percent"));
        assert!(text.contains("three major features"));
    }

    #[test]
    fn test_source_input_classification() {
        assert_eq!(
            SourceInput::from_arg("https://example.com/post"),
            SourceInput::Url("https://example.com/post".to_string())
        );
        assert_eq!(
            SourceInput::from_arg("just a thought I had"),
            SourceInput::RawText("just a thought I had".to_string())
        );
    }

    #[tokio::test]
    async fn test_raw_text_extraction() {
        let extractor = HttpExtractor::new(Duration::from_secs(5)).unwrap();
        let input = SourceInput::RawText("My Title\n\nSome body text here.".to_string());

        let content = extractor.extract(&input).await.unwrap();
        assert_eq!(content.source, "pasted_text");
        assert_eq!(content.title.as_deref(), Some("My Title"));
        assert_eq!(content.word_count(), 6);
        assert!(!content.content_hash.is_empty());
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let extractor = HttpExtractor::new(Duration::from_secs(5)).unwrap();
        let input = SourceInput::RawText("   \n  ".to_string());

        let error = extractor.extract(&input).await.unwrap_err();
        assert!(matches!(error, ExtractError::EmptyContent(_)));
    }

    #[tokio::test]
    async fn test_unsupported_extension_rejected() {
        let extractor = HttpExtractor::new(Duration::from_secs(5)).unwrap();
        let input = SourceInput::Document(PathBuf::from("slides.pptx"));

        let error = extractor.extract(&input).await.unwrap_err();
        assert!(matches!(error, ExtractError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn test_url_extraction_from_mock_server() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/post")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(PAGE)
            .create_async()
            .await;

        let extractor = HttpExtractor::new(Duration::from_secs(5)).unwrap();
        let url = format!("{}/post", server.url());
        let content = extractor.extract(&SourceInput::Url(url.clone())).await.unwrap();

        assert_eq!(content.source, url);
        assert_eq!(content.title.as_deref(), Some("Quarterly Review"));
        assert!(content.text.contains("Revenue grew"));
    }

    #[tokio::test]
    async fn test_unreachable_url_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/gone")
            .with_status(404)
            .create_async()
            .await;

        let extractor = HttpExtractor::new(Duration::from_secs(5)).unwrap();
        let url = format!("{}/gone", server.url());
        let error = extractor
            .extract(&SourceInput::Url(url))
            .await
            .unwrap_err();

        assert!(matches!(error, ExtractError::UnreachableSource { .. }));
    }

    #[tokio::test]
    async fn test_text_file_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        tokio::fs::write(&path, "# Release Notes\n\nShipped the new onboarding flow.")
            .await
            .unwrap();

        let extractor = HttpExtractor::new(Duration::from_secs(5)).unwrap();
        let content = extractor
            .extract(&SourceInput::Document(path))
            .await
            .unwrap();

        assert_eq!(content.title.as_deref(), Some("# Release Notes"));
        assert!(content.text.contains("onboarding flow"));
    }
}
