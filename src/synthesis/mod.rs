//! Grounded remediation synthesis.
//!
//! [`SolutionSynthesizer`] turns retrieved evidence into a numbered list of
//! remediation steps. It first asks a [`GenerativeProvider`] to phrase them;
//! when there is no provider, or the provider fails, times out, or answers
//! with nothing recognizable as steps, it falls back to listing the evidence
//! payloads verbatim. Synthesis itself never fails.

pub mod ollama;


pub use ollama::OllamaGenerator;

use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use fancy_regex::Regex;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::Result;
use crate::corpus::CorpusKind;
use crate::retrieval::RetrievalResult;

/// Maps a prompt to a completion
pub trait GenerativeProvider: Send + Sync {
    fn model_name(&self) -> &str;

    fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;
}

/// Per-call budget handed to the generative provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 512,
            timeout: Duration::from_secs(30),
        }
    }
}

/// How much evidence reaches the prompt and how many steps are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptLimits {
    pub max_incidents: usize,
    pub max_articles: usize,
    pub max_steps: usize,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            max_incidents: 5,
            max_articles: 3,
            max_steps: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionSource {
    AiGenerated,
    Aggregated,
}

impl fmt::Display for SolutionSource {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SolutionSource::AiGenerated => write!(f, "ai_generated"),
            SolutionSource::Aggregated => write!(f, "aggregated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionResponse {
    pub steps: Vec<String>,
    pub source: SolutionSource,
}

impl SolutionResponse {
    #[inline]
    pub fn empty() -> Self {
        Self {
            steps: Vec::new(),
            source: SolutionSource::Aggregated,
        }
    }
}

/// Why a generative attempt was abandoned
#[derive(Debug)]
enum SynthesisFailure {
    Unavailable,
    Provider(String),
    Timeout(Duration),
    EmptyOutput,
    Unparseable,
}

impl fmt::Display for SynthesisFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "no generative provider configured"),
            Self::Provider(message) => write!(f, "provider failed: {}", message),
            Self::Timeout(budget) => write!(f, "no completion within {:?}", budget),
            Self::EmptyOutput => write!(f, "provider returned an empty completion"),
            Self::Unparseable => write!(f, "completion contained no numbered steps"),
        }
    }
}

static STEP_LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[\s>#*-]*(?:step\s*\d+\s*[:.)]|\d+\s*(?:[.)]\**\s|:))\**\s*(.*?)\s*\**\s*$")
        .expect("valid regex")
});

/// Extract numbered steps from a completion.
///
/// Accepts `Step N:`, `N.`, `N)` and `N:` prefixes, optionally wrapped in
/// markdown emphasis. A bare number needs whitespace after `.` or `)`, so
/// `1.5 GB free` is prose. Blank steps are dropped and at most `max_steps` kept.
#[inline]
pub fn parse_steps(text: &str, max_steps: usize) -> Vec<String> {
    text.lines()
        .filter_map(|line| match STEP_LINE_REGEX.captures(line) {
            Ok(Some(captures)) => captures.get(1).map(|m| m.as_str().trim().to_string()),
            _ => None,
        })
        .filter(|step| !step.is_empty())
        .take(max_steps)
        .collect()
}

/// Render the grounded prompt for `query`.
///
/// Incidents and KB articles are listed in evidence order, each section
/// truncated to its limit.
#[inline]
pub fn build_prompt(query: &str, evidence: &[RetrievalResult], limits: &PromptLimits) -> String {
    let incidents = evidence
        .iter()
        .filter(|result| result.kind == CorpusKind::Incident)
        .take(limits.max_incidents)
        .enumerate()
        .map(|(i, result)| {
            format!(
                "{}. Incident {}: {}",
                i + 1,
                result.id,
                result.resolution.as_deref().unwrap_or("No resolution recorded")
            )
        })
        .join("\n");

    let articles = evidence
        .iter()
        .filter(|result| result.kind == CorpusKind::KbArticle)
        .take(limits.max_articles)
        .enumerate()
        .map(|(i, result)| {
            format!(
                "{}. {}: {}",
                i + 1,
                result.title.as_deref().unwrap_or("Untitled"),
                result.content.as_deref().unwrap_or("")
            )
        })
        .join("\n");

    format!(
        "You are an IT incident resolution assistant. An operator reported the following issue:\n\
         \n\
         {query}\n\
         \n\
         Resolutions of similar past incidents:\n\
         {incidents}\n\
         \n\
         Relevant knowledge base articles:\n\
         {articles}\n\
         \n\
         Using only the context above, write a remediation plan of at most {max_steps} \
         concrete steps. Put each step on its own line in the form\n\
         Step 1: <action>\n\
         Step 2: <action>\n",
        query = query.trim(),
        incidents = if incidents.is_empty() { "(none)".to_string() } else { incidents },
        articles = if articles.is_empty() { "(none)".to_string() } else { articles },
        max_steps = limits.max_steps,
    )
}

/// One step per evidence item, in evidence order, as `"<id>: <payload>"`.
///
/// An item with a blank resolution or content falls back to its display text.
#[inline]
pub fn aggregate(evidence: &[RetrievalResult]) -> SolutionResponse {
    let steps = evidence
        .iter()
        .map(|result| {
            let detail = result
                .payload_text()
                .map(str::trim)
                .filter(|payload| !payload.is_empty())
                .unwrap_or_else(|| result.text.trim());
            if detail.is_empty() {
                result.id.clone()
            } else {
                format!("{}: {}", result.id, detail)
            }
        })
        .collect();

    SolutionResponse {
        steps,
        source: SolutionSource::Aggregated,
    }
}

#[derive(Clone)]
pub struct SolutionSynthesizer {
    generator: Option<Arc<dyn GenerativeProvider>>,
    options: GenerationOptions,
    limits: PromptLimits,
}

impl SolutionSynthesizer {
    #[inline]
    pub fn new(generator: Option<Arc<dyn GenerativeProvider>>) -> Self {
        Self {
            generator,
            options: GenerationOptions::default(),
            limits: PromptLimits::default(),
        }
    }

    #[inline]
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    #[inline]
    pub fn with_limits(mut self, limits: PromptLimits) -> Self {
        self.limits = limits;
        self
    }

    #[inline]
    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    #[inline]
    pub fn limits(&self) -> &PromptLimits {
        &self.limits
    }

    #[inline]
    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Produce remediation steps for `query` grounded in `evidence`.
    ///
    /// Blocks for as long as the provider takes, bounded by its own timeout.
    #[inline]
    pub fn synthesize(&self, query: &str, evidence: &[RetrievalResult]) -> SolutionResponse {
        if evidence.is_empty() {
            debug!("No evidence retrieved, returning an empty solution");
            return SolutionResponse::empty();
        }

        match self.generate_steps(query, evidence) {
            Ok(steps) => {
                info!("Generated {} remediation steps", steps.len());
                SolutionResponse {
                    steps,
                    source: SolutionSource::AiGenerated,
                }
            }
            Err(failure) => self.fallback(evidence, &failure),
        }
    }

    /// Aggregate `evidence` after the generative call overran `budget`
    #[inline]
    pub fn timed_out(&self, evidence: &[RetrievalResult], budget: Duration) -> SolutionResponse {
        if evidence.is_empty() {
            return SolutionResponse::empty();
        }
        self.fallback(evidence, &SynthesisFailure::Timeout(budget))
    }

    fn fallback(&self, evidence: &[RetrievalResult], failure: &SynthesisFailure) -> SolutionResponse {
        warn!("Falling back to aggregated solution: {}", failure);
        aggregate(evidence)
    }

    fn generate_steps(
        &self,
        query: &str,
        evidence: &[RetrievalResult],
    ) -> std::result::Result<Vec<String>, SynthesisFailure> {
        let generator = self.generator.as_ref().ok_or(SynthesisFailure::Unavailable)?;

        let prompt = build_prompt(query, evidence, &self.limits);
        debug!(
            "Requesting completion from {} (prompt length: {})",
            generator.model_name(),
            prompt.len()
        );

        let completion = generator
            .generate(&prompt, &self.options)
            .map_err(|e| SynthesisFailure::Provider(e.to_string()))?;

        if completion.trim().is_empty() {
            return Err(SynthesisFailure::EmptyOutput);
        }

        let steps = parse_steps(&completion, self.limits.max_steps);
        if steps.is_empty() {
            return Err(SynthesisFailure::Unparseable);
        }

        Ok(steps)
    }
}
