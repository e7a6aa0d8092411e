//! Optional suggestion service
//!
//! Reports can be enriched with free-text suggestions from an
//! Ollama-compatible model server. The service is a collaborator: any
//! failure becomes [`Suggestions::Unavailable`] and never fails a run.

use crate::config::SuggestionConfig;
use crate::error::SuggestionError;
use crate::report::{AnalysisReport, Suggestions};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the service is told about one analyzed target
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionRequest {
    pub target: String,
    pub source: Option<String>,
    pub execution_time_secs: f64,
    pub peak_memory_bytes: u64,
    pub status: String,
    pub error: Option<String>,
    pub patterns: Vec<String>,
    /// cProfile hotspots, most expensive first
    pub hotspots: Vec<String>,
    pub comparison: Option<String>,
}

impl SuggestionRequest {
    /// Build a request from a report; `source` is cut to `max_source_bytes`
    pub fn from_report(report: &AnalysisReport, source: Option<&str>, max_source_bytes: usize) -> Self {
        let result = &report.result;
        Self {
            target: report.target.display_name(),
            source: source.map(|s| truncate(s, max_source_bytes).to_string()),
            execution_time_secs: result.summary.execution_time_secs,
            peak_memory_bytes: result.summary.peak_memory_bytes,
            status: result.status.as_str().to_string(),
            error: result
                .error
                .as_ref()
                .map(|e| format!("{}: {}", e.class, e.message)),
            patterns: report
                .patterns
                .as_ref()
                .map(|tags| tags.iter().map(|t| t.id.clone()).collect())
                .unwrap_or_default(),
            hotspots: result
                .hotspots
                .iter()
                .map(|h| {
                    format!(
                        "{} - {} calls, {:.3}s cumulative",
                        h.location(),
                        h.calls,
                        h.cumulative_secs
                    )
                })
                .collect(),
            comparison: report
                .comparison
                .as_ref()
                .map(|c| c.to_report_string()),
        }
    }

    pub fn prompt(&self) -> String {
        let mut prompt = String::from("Analyze this code and provide a concise optimization.\n\n");
        prompt.push_str(&format!("Target: {}\n", self.target));
        if let Some(source) = &self.source {
            prompt.push_str(&format!("Original Code:\n{source}\n\n"));
        }
        prompt.push_str(&format!(
            "Profiling Results:\nStatus: {}\nTime: {:.2}s\nMemory: {:.2}MB\n",
            self.status,
            self.execution_time_secs,
            self.peak_memory_bytes as f64 / (1024.0 * 1024.0)
        ));
        if let Some(error) = &self.error {
            prompt.push_str(&format!("Error: {error}\n"));
        }
        if !self.patterns.is_empty() {
            prompt.push_str(&format!("Detected patterns: {}\n", self.patterns.join(", ")));
        }
        if !self.hotspots.is_empty() {
            prompt.push_str("Top functions by cumulative time:\n");
            for hotspot in &self.hotspots {
                prompt.push_str(&format!("- {hotspot}\n"));
            }
        }
        if let Some(comparison) = &self.comparison {
            prompt.push_str(&format!("\n{comparison}\n"));
        }
        prompt.push_str(
            "\nProvide a SHORT response in this format:\n\n=== Problems ===\n- ...\n\n=== Optimizations ===\n- ...\n",
        );
        prompt
    }
}

fn truncate(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// A service producing suggestion text
pub trait SuggestionService {
    fn suggest(&self, request: &SuggestionRequest) -> Result<String, SuggestionError>;
}

/// Ask the service; failures are logged and folded into the result
pub fn request_suggestions(service: &dyn SuggestionService, request: &SuggestionRequest) -> Suggestions {
    match service.suggest(request) {
        Ok(text) => Suggestions::Available { text },
        Err(err) => {
            tracing::warn!(target = %request.target, "suggestions unavailable: {}", err);
            Suggestions::Unavailable {
                reason: err.to_string(),
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for the Ollama `/api/generate` endpoint
#[derive(Debug, Clone)]
pub struct OllamaClient {
    url: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl OllamaClient {
    pub fn new(config: &SuggestionConfig) -> Result<Self, SuggestionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| SuggestionError::Unreachable {
                url: config.url.clone(),
                reason: err.to_string(),
            })?;
        Ok(Self {
            url: config.url.clone(),
            model: config.model.clone(),
            client,
        })
    }
}

impl SuggestionService for OllamaClient {
    fn suggest(&self, request: &SuggestionRequest) -> Result<String, SuggestionError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt: request.prompt(),
            stream: false,
        };

        tracing::debug!(url = %self.url, model = %self.model, "requesting suggestions");
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .map_err(|err| SuggestionError::Unreachable {
                url: self.url.clone(),
                reason: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SuggestionError::Status {
                status: status.as_u16(),
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|err| SuggestionError::Malformed(err.to_string()))?;
        Ok(parsed.response)
    }
}
