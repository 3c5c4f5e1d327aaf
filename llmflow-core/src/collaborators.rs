//! Collaborator seams — the narrow contracts the engine consumes.
//!
//! The core does not implement NLP, search, or LLM calls. It consumes
//! them through these traits: a query planner (intent analysis), search
//! tools, an LLM completion service, a report synthesizer, and a
//! key-value memory store. Each collaborator owns its own timeout,
//! retry, and caching policy.
//!
//! Mock implementations live here (not behind `cfg(test)`) so the
//! server binary can run the whole system offline and so downstream
//! crates can drive the engine deterministically.

use crate::error::CollaboratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One engine-optimized query produced by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineQuery {
    /// Target search engine, e.g. "duckduckgo" or "wikipedia".
    pub engine: String,
    /// The optimized query string.
    pub query: String,
}

/// A raw search result before merging into task state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub extracted_text: String,
}

/// Intent analysis / query planning collaborator.
#[async_trait]
pub trait QueryPlanner: Send + Sync {
    /// Produce an ordered set of per-engine optimized queries, seeded
    /// by the original query and the gaps found in the previous
    /// iteration (empty on the first pass).
    async fn plan_queries(
        &self,
        query: &str,
        prior_gaps: &[String],
    ) -> Result<Vec<EngineQuery>, CollaboratorError>;
}

/// Search/fetch tool collaborator. One call per engine query.
#[async_trait]
pub trait SearchTool: Send + Sync {
    async fn search(&self, query: &EngineQuery) -> Result<Vec<SearchHit>, CollaboratorError>;
}

/// LLM completion collaborator. Owns its own caching and retries.
#[async_trait]
pub trait LlmService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError>;
}

/// Report synthesis collaborator.
#[async_trait]
pub trait ReportSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        query: &str,
        findings: &[crate::task::Finding],
        sources: &[crate::task::SourceRef],
    ) -> Result<String, CollaboratorError>;
}

/// Long-term key-value memory collaborator.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn put(&self, key: &str, value: &str);
}

// ---------------------------------------------------------------------
// Mock implementations
// ---------------------------------------------------------------------

/// Planner that fans the query out to a fixed engine list, appending
/// one follow-up query per prior gap.
pub struct MockPlanner {
    engines: Vec<String>,
}

impl MockPlanner {
    pub fn new() -> Self {
        Self {
            engines: vec!["duckduckgo".into(), "wikipedia".into()],
        }
    }

    pub fn with_engines(engines: Vec<String>) -> Self {
        Self { engines }
    }
}

impl Default for MockPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryPlanner for MockPlanner {
    async fn plan_queries(
        &self,
        query: &str,
        prior_gaps: &[String],
    ) -> Result<Vec<EngineQuery>, CollaboratorError> {
        let mut queries: Vec<EngineQuery> = self
            .engines
            .iter()
            .map(|engine| EngineQuery {
                engine: engine.clone(),
                query: query.to_string(),
            })
            .collect();
        for gap in prior_gaps {
            queries.push(EngineQuery {
                engine: self.engines.first().cloned().unwrap_or_default(),
                query: format!("{query} {gap}"),
            });
        }
        Ok(queries)
    }
}

/// Scriptable search tool: returns canned hits, or fails every call.
pub struct MockSearchTool {
    hits: Vec<SearchHit>,
    always_fail: bool,
    calls: AtomicUsize,
}

impl MockSearchTool {
    /// Tool that returns the given hits for every query.
    pub fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            always_fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Tool whose every call fails.
    pub fn failing() -> Self {
        Self {
            hits: Vec::new(),
            always_fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Convenience single-hit tool.
    pub fn single(url: &str, title: &str, text: &str) -> Self {
        Self::with_hits(vec![SearchHit {
            url: url.into(),
            title: title.into(),
            extracted_text: text.into(),
        }])
    }

    /// Number of search calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SearchTool for MockSearchTool {
    async fn search(&self, query: &EngineQuery) -> Result<Vec<SearchHit>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.always_fail {
            return Err(CollaboratorError::Search {
                engine: query.engine.clone(),
                message: "simulated failure".into(),
            });
        }
        Ok(self.hits.clone())
    }
}

/// LLM mock with queued responses, consumed front-to-back. When the
/// queue is empty it falls back to a fixed default response.
pub struct MockLlm {
    responses: Mutex<Vec<String>>,
    default_response: String,
    fail: bool,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            default_response: "sufficient".into(),
            fail: false,
        }
    }

    /// LLM that always returns the given text.
    pub fn with_response(text: &str) -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            default_response: text.into(),
            fail: false,
        }
    }

    /// LLM whose every call fails.
    pub fn failing() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            default_response: String::new(),
            fail: true,
        }
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, text: impl Into<String>) {
        self.responses.lock().unwrap().push(text.into());
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmService for MockLlm {
    async fn complete(&self, _prompt: &str) -> Result<String, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::Llm {
                message: "simulated failure".into(),
            });
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }
}

/// Synthesizer that renders a plain-text report from the accumulated
/// findings and sources, or fails every call.
pub struct MockSynthesizer {
    fail: bool,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReportSynthesizer for MockSynthesizer {
    async fn synthesize(
        &self,
        query: &str,
        findings: &[crate::task::Finding],
        sources: &[crate::task::SourceRef],
    ) -> Result<String, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::Llm {
                message: "simulated synthesis failure".into(),
            });
        }
        let mut report = format!("# {query}\n\n");
        if findings.is_empty() {
            report.push_str("No findings were gathered for this query.\n");
        } else {
            for finding in findings {
                report.push_str(&format!("- {} ({})\n", finding.text, finding.url));
            }
        }
        if !sources.is_empty() {
            report.push_str("\n## Sources\n");
            for source in sources {
                report.push_str(&format!("- [{}]({})\n", source.title, source.url));
            }
        }
        Ok(report)
    }
}

/// In-memory key-value store.
pub struct InMemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.items.lock().unwrap().get(key).cloned()
    }

    async fn put(&self, key: &str, value: &str) {
        self.items
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_planner_fans_out() {
        let planner = MockPlanner::new();
        let queries = planner.plan_queries("rust async", &[]).await.unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].engine, "duckduckgo");
        assert_eq!(queries[1].engine, "wikipedia");
    }

    #[tokio::test]
    async fn test_mock_planner_appends_gap_queries() {
        let planner = MockPlanner::new();
        let gaps = vec!["release date".to_string()];
        let queries = planner.plan_queries("rust async", &gaps).await.unwrap();
        assert_eq!(queries.len(), 3);
        assert!(queries[2].query.contains("release date"));
    }

    #[tokio::test]
    async fn test_mock_search_failing() {
        let tool = MockSearchTool::failing();
        let query = EngineQuery {
            engine: "duckduckgo".into(),
            query: "x".into(),
        };
        assert!(tool.search(&query).await.is_err());
        assert_eq!(tool.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_llm_queued_responses() {
        let llm = MockLlm::with_response("fallback");
        llm.queue_response("first");
        llm.queue_response("second");
        assert_eq!(llm.complete("p").await.unwrap(), "first");
        assert_eq!(llm.complete("p").await.unwrap(), "second");
        assert_eq!(llm.complete("p").await.unwrap(), "fallback");
    }

    #[tokio::test]
    async fn test_mock_synthesizer_renders_sources() {
        let synth = MockSynthesizer::new();
        let findings = vec![crate::task::Finding {
            text: "Paris is the capital".into(),
            url: "https://en.wikipedia.org/wiki/Paris".into(),
            engine: "wikipedia".into(),
        }];
        let sources = vec![crate::task::SourceRef {
            url: "https://en.wikipedia.org/wiki/Paris".into(),
            title: "Paris".into(),
        }];
        let report = synth
            .synthesize("capital of France", &findings, &sources)
            .await
            .unwrap();
        assert!(report.contains("capital of France"));
        assert!(report.contains("## Sources"));
    }

    #[tokio::test]
    async fn test_in_memory_store_roundtrip() {
        let store = InMemoryStore::new();
        assert!(store.get("k").await.is_none());
        store.put("k", "v").await;
        assert_eq!(store.get("k").await.as_deref(), Some("v"));
    }
}
