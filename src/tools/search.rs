//! Web search over the DuckDuckGo HTML endpoint (no API key needed)

use super::{InputSchema, Tool};
use crate::models::{ToolInput, ToolOutput};
use crate::Result;
use regex::Regex;
use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

const SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const MAX_RESULTS: usize = 5;

pub struct WebSearchTool {
    client: Client,
    base_url: String,
}

impl WebSearchTool {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(SEARCH_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; WealthAdvisor/1.0)")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "search"
    }

    fn description(&self) -> &'static str {
        "Searches the web for current news and general information. \
         Returns titles, snippets and URLs of the top results."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::Text { required: true }
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let query = input.as_text().unwrap_or_default();
        let url = format!("{}?q={}", self.base_url, urlencoding::encode(query));

        debug!(query, "Running web search");

        let html = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let results = extract_results(&html);
        if results.is_empty() {
            Ok(ToolOutput::text(format!("No results found for: {}", query)))
        } else {
            Ok(ToolOutput::text(results.join("\n\n")))
        }
    }
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"))
}

/// Text of the element carrying `class`, up to its closing tag.
fn element_text(chunk: &str, class: &str, closing: &str) -> Option<String> {
    let after = chunk.split(class).nth(1)?;
    let body = &after[after.find('>')? + 1..];
    let body = body.split(closing).next()?;
    let text = tag_regex().replace_all(body, "");
    let text = html_decode(text.trim());
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn extract_results(html: &str) -> Vec<String> {
    html.split("result__body\"")
        .skip(1)
        .filter_map(|chunk| {
            let title = element_text(chunk, "class=\"result__a\"", "</a>")?;
            let snippet = element_text(chunk, "class=\"result__snippet\"", "</a>")
                .unwrap_or_else(|| "No snippet".to_string());
            let url = element_text(chunk, "class=\"result__url\"", "</a>").unwrap_or_default();
            Some(format!("**{}**\n{}\nURL: {}", title, snippet, url))
        })
        .take(MAX_RESULTS)
        .collect()
}

fn html_decode(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
}
