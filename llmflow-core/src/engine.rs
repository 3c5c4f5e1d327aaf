//! Research loop engine — runs one task end-to-end.
//!
//! Per iteration: plan -> search & extract -> verify -> decide. The
//! loop ends on a `Sufficient` verdict or at the iteration ceiling,
//! then synthesizes a report from whatever was gathered. A failed
//! search or planning call degrades to empty results; a failed
//! verification or synthesis call fails the task.

use crate::collaborators::{
    EngineQuery, LlmService, MemoryStore, QueryPlanner, ReportSynthesizer, SearchTool,
};
use crate::metrics::Metrics;
use crate::progress::{ProgressBroadcaster, ProgressEvent};
use crate::task::{Finding, ResearchTask};
use crate::verify::{Verdict, verification_prompt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The set of external collaborators one engine instance consumes.
#[derive(Clone)]
pub struct Collaborators {
    pub planner: Arc<dyn QueryPlanner>,
    pub search: Arc<dyn SearchTool>,
    pub llm: Arc<dyn LlmService>,
    pub synthesizer: Arc<dyn ReportSynthesizer>,
    pub memory: Arc<dyn MemoryStore>,
}

/// Executes the iterative refine-search-verify loop for one task at a
/// time. Stateless between runs; each task is owned exclusively by the
/// engine instance processing it.
pub struct ResearchEngine {
    collaborators: Collaborators,
    metrics: Arc<Metrics>,
    /// How many hits per engine query are merged into findings.
    parse_top_results: usize,
}

impl ResearchEngine {
    pub fn new(collaborators: Collaborators, metrics: Arc<Metrics>) -> Self {
        Self {
            collaborators,
            metrics,
            parse_top_results: 3,
        }
    }

    pub fn with_parse_top_results(mut self, n: usize) -> Self {
        self.parse_top_results = n.max(1);
        self
    }

    /// Run the task to a terminal status, emitting progress events as a
    /// side effect. Always returns the task; callers read `status` to
    /// distinguish completion from failure.
    pub async fn run(
        &self,
        mut task: ResearchTask,
        broadcaster: &ProgressBroadcaster,
    ) -> ResearchTask {
        info!(task_id = %task.id, query = %task.query, max_iterations = task.max_iterations, "research task started");
        task.start();
        self.metrics.record_task_started();
        broadcaster.publish(ProgressEvent::Status {
            message: format!("Processing query: {}", task.query),
        });

        let mut gaps: Vec<String> = Vec::new();

        while task.iteration_count < task.max_iterations {
            task.iteration_count += 1;
            let iteration = task.iteration_count;

            let queries = self.plan(&task, &gaps, broadcaster).await;
            let new_sources = self.search_and_extract(&mut task, &queries, broadcaster).await;
            broadcaster.publish(ProgressEvent::PartialResult {
                iteration,
                new_sources,
            });

            let verdict = match self.verify(&task, broadcaster).await {
                Ok(verdict) => verdict,
                Err(reason) => {
                    warn!(task_id = %task.id, %reason, "verification failed, task fatal");
                    task.fail(reason.clone());
                    self.metrics.record_task_failed();
                    broadcaster.publish(ProgressEvent::Failed { reason });
                    return task;
                }
            };

            match verdict {
                Verdict::Sufficient => {
                    info!(task_id = %task.id, iteration, "findings sufficient, stopping refinement");
                    broadcaster.publish(ProgressEvent::Status {
                        message: format!("Findings sufficient after iteration {iteration}"),
                    });
                    break;
                }
                other => {
                    gaps = other.follow_up_gaps().to_vec();
                    let kind = match &other {
                        Verdict::Contradictory { .. } => "contradictory findings",
                        _ => "insufficient findings",
                    };
                    debug!(task_id = %task.id, iteration, follow_ups = gaps.len(), "{kind}, continuing");
                    broadcaster.publish(ProgressEvent::Status {
                        message: format!(
                            "Iteration {iteration}: {kind}, refining with {} follow-up(s)",
                            gaps.len()
                        ),
                    });
                }
            }
        }

        self.synthesize(task, broadcaster).await
    }

    /// Plan the next query set. A planner failure degrades to a
    /// single-step fallback plan of the raw query.
    async fn plan(
        &self,
        task: &ResearchTask,
        gaps: &[String],
        broadcaster: &ProgressBroadcaster,
    ) -> Vec<EngineQuery> {
        broadcaster.publish(ProgressEvent::Status {
            message: format!(
                "Iteration {}/{}: planning queries",
                task.iteration_count, task.max_iterations
            ),
        });

        self.metrics.record_planner_call();
        let _timer = self.metrics.timer("plan");
        let queries = match self.collaborators.planner.plan_queries(&task.query, gaps).await {
            Ok(queries) if !queries.is_empty() => queries,
            Ok(_) | Err(_) => {
                self.metrics.record_planner_error();
                warn!(task_id = %task.id, "planner unavailable, falling back to raw query");
                vec![EngineQuery {
                    engine: "duckduckgo".into(),
                    query: task.query.clone(),
                }]
            }
        };

        broadcaster.publish(ProgressEvent::Status {
            message: format!("Planned {} search queries", queries.len()),
        });
        queries
    }

    /// Execute every planned query, merging deduplicated results into
    /// the task. A failed call counts as no results for that query.
    async fn search_and_extract(
        &self,
        task: &mut ResearchTask,
        queries: &[EngineQuery],
        broadcaster: &ProgressBroadcaster,
    ) -> usize {
        let mut new_sources = 0;
        for query in queries {
            broadcaster.publish(ProgressEvent::Status {
                message: format!("Searching {} for: {}", query.engine, query.query),
            });

            self.metrics.record_search_call();
            let _timer = self.metrics.timer("search");
            let hits = match self.collaborators.search.search(query).await {
                Ok(hits) => hits,
                Err(err) => {
                    self.metrics.record_search_error();
                    warn!(task_id = %task.id, engine = %query.engine, error = %err, "search call failed, treating as no results");
                    continue;
                }
            };

            for hit in hits.into_iter().take(self.parse_top_results) {
                if task.add_source(&hit.url, &hit.title) {
                    new_sources += 1;
                    task.add_finding(Finding {
                        text: hit.extracted_text,
                        url: hit.url,
                        engine: query.engine.clone(),
                    });
                }
            }
        }

        self.metrics.record_sources_merged(new_sources as u64);
        broadcaster.publish(ProgressEvent::Status {
            message: format!("Merged {new_sources} new source(s)"),
        });
        new_sources
    }

    /// Ask the LLM whether the findings answer the query. An LLM
    /// failure here is fatal for the task.
    async fn verify(
        &self,
        task: &ResearchTask,
        broadcaster: &ProgressBroadcaster,
    ) -> Result<Verdict, String> {
        broadcaster.publish(ProgressEvent::Status {
            message: "Verifying findings".into(),
        });

        let prompt = verification_prompt(&task.query, &task.findings);
        self.metrics.record_llm_call();
        let _timer = self.metrics.timer("verify");
        let response = self
            .collaborators
            .llm
            .complete(&prompt)
            .await
            .map_err(|err| {
                self.metrics.record_llm_error();
                format!("verification failed: {err}")
            })?;

        Ok(Verdict::parse(&response))
    }

    /// Produce the final report. Runs even when the loop stopped at the
    /// iteration ceiling (best-effort report from partial findings).
    async fn synthesize(
        &self,
        mut task: ResearchTask,
        broadcaster: &ProgressBroadcaster,
    ) -> ResearchTask {
        broadcaster.publish(ProgressEvent::Status {
            message: "Synthesizing report".into(),
        });

        let _timer = self.metrics.timer("synthesize");
        match self
            .collaborators
            .synthesizer
            .synthesize(&task.query, &task.findings, &task.sources)
            .await
        {
            Ok(report) => {
                task.complete(report.clone());
                self.metrics.record_task_completed();
                self.remember(&task).await;
                info!(task_id = %task.id, iterations = task.iteration_count, sources = task.sources.len(), "research task completed");
                broadcaster.publish(ProgressEvent::Completed {
                    report,
                    sources: task.sources.clone(),
                });
            }
            Err(err) => {
                let reason = format!("synthesis failed: {err}");
                warn!(task_id = %task.id, %reason, "research task failed");
                task.fail(reason.clone());
                self.metrics.record_task_failed();
                broadcaster.publish(ProgressEvent::Failed { reason });
            }
        }
        task
    }

    /// Record the completed task in long-term memory.
    async fn remember(&self, task: &ResearchTask) {
        let record = serde_json::json!({
            "query": task.query,
            "iterations": task.iteration_count,
            "sources": task.sources.len(),
            "completed_at": task.updated_at,
        });
        self.collaborators
            .memory
            .put(&format!("task:{}", task.id), &record.to_string())
            .await;
    }
}
