//! Crawl request shapes and validation.
//!
//! A crawl starts from one seed request per target. Targets answer a seed
//! with pages to visit, and each page becomes an extraction request that
//! inherits the seed's context. The orchestrator stamps the bookkeeping
//! fields itself, so a target only ever supplies URLs and keys.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::RequestValidationError;
use crate::types::{Tool, ToolTarget};

/// What a request is asking a target to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    /// Seed request: the target derives its own entry point.
    #[serde(rename = "target-request")]
    Target,
    /// Visit one URL discovered during pagination.
    #[serde(rename = "extraction-request")]
    Extraction,
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RequestKind::Target => "target-request",
            RequestKind::Extraction => "extraction-request",
        };
        f.write_str(label)
    }
}

/// A page a target wants visited. The key deduplicates within a crawl and
/// defaults to the URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub url: String,
    #[serde(default)]
    pub unique_key: String,
}

impl PageRequest {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            unique_key: url.clone(),
            url,
        }
    }

    pub fn with_key(url: impl Into<String>, unique_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            unique_key: unique_key.into(),
        }
    }
}

/// One unit of crawl work, carrying the target context it runs under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRequest {
    /// Empty on seed requests; a parseable URL on extraction requests.
    pub url: String,
    pub target_id: String,
    pub target_name: String,
    pub keywords: Vec<String>,
    pub max_pages: u32,
    #[serde(rename = "type")]
    pub kind: RequestKind,
    pub unique_key: String,
}

impl CrawlRequest {
    /// The seed request for one target of a tool, with per-target overrides
    /// already resolved.
    pub fn seed(tool: &Tool, target: &ToolTarget) -> Self {
        Self {
            url: String::new(),
            target_id: target.target_id.clone(),
            target_name: target.target_name.clone(),
            keywords: tool.effective_keywords(target),
            max_pages: tool.effective_max_pages(target),
            kind: RequestKind::Target,
            unique_key: target.target_id.clone(),
        }
    }

    /// An extraction request for a discovered page, inheriting the parent's
    /// target context.
    pub fn extraction(page: PageRequest, parent: &CrawlRequest) -> Self {
        let unique_key = if page.unique_key.is_empty() {
            page.url.clone()
        } else {
            page.unique_key
        };
        Self {
            url: page.url,
            target_id: parent.target_id.clone(),
            target_name: parent.target_name.clone(),
            keywords: parent.keywords.clone(),
            max_pages: parent.max_pages,
            kind: RequestKind::Extraction,
            unique_key,
        }
    }

    /// Check the request is well formed before handing it to a target.
    pub fn validate(&self) -> Result<(), RequestValidationError> {
        if self.target_name.trim().is_empty() {
            return Err(RequestValidationError::MissingTargetName);
        }
        if self.kind == RequestKind::Extraction {
            if self.unique_key.is_empty() {
                return Err(RequestValidationError::MissingUniqueKey);
            }
            if let Err(source) = Url::parse(&self.url) {
                return Err(RequestValidationError::InvalidUrl {
                    url: self.url.clone(),
                    source,
                });
            }
        }
        Ok(())
    }
}
