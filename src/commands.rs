use anyhow::{Context, Result};
use console::style;
use itertools::Itertools;

use crate::assistant::{IncidentAssistant, Resolution};
use crate::autoheal::{HealPlan, RuleTable};
use crate::config::Config;
use crate::corpus::CorpusKind;
use crate::embeddings::OllamaClient;
use crate::retrieval::{RetrievalResult, filter_by_kind};
use crate::synthesis::OllamaGenerator;


const PREVIEW_CHARS: usize = 160;

async fn open_assistant(config: &Config) -> Result<IncidentAssistant> {
    IncidentAssistant::open(config)
        .await
        .context("Failed to initialize incident assistant")
}

/// Rebuild the index from the corpus directory and activate it
#[inline]
pub async fn build_index(config: &Config) -> Result<()> {
    let mut config = config.clone();
    config.retrieval.auto_rebuild = false;

    println!(
        "Building index from {}",
        style(config.corpus_dir().display()).cyan()
    );

    let assistant = open_assistant(&config).await?;
    let index = assistant.refresh().await.context("Index build failed")?;

    println!("{}", style("✓ Index built").green());
    println!("   Snapshot: {}", index.id());
    println!("   Items: {}", index.len());
    println!("   Model: {} ({} dims)", index.embedding_model(), index.dimension());
    println!("   Stored at: {}", config.index_path().display());
    Ok(())
}

/// Report provider health and index freshness
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 Incident Assist Status");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Embedding backend:");
    let ollama = config.ollama.clone();
    let embedding_health = tokio::task::spawn_blocking(move || {
        OllamaClient::new(&ollama).and_then(|client| client.health_check())
    })
    .await
    .context("Health check task failed")?;
    match embedding_health {
        Ok(()) => println!(
            "   ✅ Ollama: Connected ({}:{}), model {}",
            config.ollama.host, config.ollama.port, config.ollama.model
        ),
        Err(e) => println!("   ❌ Ollama: {:#}", e),
    }

    println!("✍️  Generation backend:");
    if config.generation.enabled {
        let ollama = config.ollama.clone();
        let generation = config.generation.clone();
        let generation_health = tokio::task::spawn_blocking(move || {
            OllamaGenerator::new(&ollama, &generation).and_then(|g| g.health_check())
        })
        .await
        .context("Health check task failed")?;
        match generation_health {
            Ok(()) => println!("   ✅ Model {} available", config.generation.model),
            Err(e) => println!(
                "   ⚠️  {:#} (solutions will be aggregated from evidence)",
                e
            ),
        }
    } else {
        println!("   💤 Disabled (solutions are aggregated from evidence)");
    }

    println!();
    println!("🔍 Index:");
    let mut config = config.clone();
    config.retrieval.auto_rebuild = false;
    let assistant = open_assistant(&config).await?;
    match assistant.status().await {
        Ok(status) => {
            let marker = if status.fresh { "✅" } else { "⚠️ " };
            println!("   {} {}", marker, status.summary());
            println!("   Corpus items: {}", status.corpus_count);
            println!("   Indexed items: {}", status.item_count);
            if let Some(model) = &status.embedding_model {
                println!("   Embedding model: {}", model);
            }
        }
        Err(e) => println!("   ❌ Cannot read corpus: {}", e),
    }
    println!("   Stored at: {}", config.index_path().display());

    Ok(())
}

/// Print the `k` most similar corpus items, optionally of one kind, followed
/// by the KB articles linked to the retrieved incidents
#[inline]
pub async fn search(
    config: &Config,
    query: &str,
    k: Option<usize>,
    kind: Option<CorpusKind>,
) -> Result<()> {
    let assistant = open_assistant(config).await?;
    let k = k.unwrap_or(assistant.default_k());
    let results = assistant.search(query, k).await?;
    let mapped = if kind == Some(CorpusKind::Incident) {
        Vec::new()
    } else {
        assistant.mapped_kb_articles(&results)?
    };
    let results = match kind {
        Some(kind) => filter_by_kind(&results, kind),
        None => results,
    };

    if results.is_empty() && mapped.is_empty() {
        println!("No similar incidents or articles found.");
        return Ok(());
    }

    println!("Results for {}:", style(query).bold());
    println!();
    for (rank, result) in results.iter().enumerate() {
        println!("{}. {}", rank + 1, format_result(result));
    }

    if !mapped.is_empty() {
        println!();
        println!("{}", style("KB articles linked to these incidents:").bold());
        for result in &mapped {
            println!("- {}", format_result(result));
        }
    }
    Ok(())
}

/// Retrieve evidence and print a remediation plan
#[inline]
pub async fn solve(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let assistant = open_assistant(config).await?;
    let resolution = assistant.solve(query, k).await?;
    println!("{}", format_resolution(&resolution));
    Ok(())
}

/// Print the action the rule table proposes; nothing is executed
#[inline]
pub fn heal(description: &str, target: Option<&str>) -> HealPlan {
    let plan = RuleTable::default().plan(description, target);
    println!("Proposed action: {}", style(plan.action).bold());
    println!("Command (not executed): {}", plan.command);
    plan
}

/// One result as `[kind] id (score) preview`
#[inline]
pub fn format_result(result: &RetrievalResult) -> String {
    let headline = match result.kind {
        CorpusKind::Incident => format!("[incident] {}", result.id),
        CorpusKind::KbArticle => format!(
            "[kb] {} {}",
            result.id,
            result.title.as_deref().unwrap_or_default()
        ),
    };

    let labels = [result.application.as_deref(), result.severity.as_deref()]
        .into_iter()
        .flatten()
        .join(", ");

    let labels = if labels.is_empty() {
        String::new()
    } else {
        format!(" [{}]", labels)
    };
    let payload = result
        .payload_text()
        .map(|payload| format!("\n   → {}", preview(payload)))
        .unwrap_or_default();

    format!(
        "{} ({:.3}){}\n   {}{}",
        headline.trim_end(),
        result.score,
        labels,
        preview(&result.text),
        payload
    )
}

#[inline]
pub fn format_resolution(resolution: &Resolution) -> String {
    if resolution.solution.steps.is_empty() {
        return "No grounding evidence found; no remediation can be suggested.".to_string();
    }

    let steps = resolution
        .solution
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("Step {}: {}", i + 1, step))
        .join("\n");

    let sources = resolution.evidence.iter().map(|r| r.id.as_str()).join(", ");

    format!(
        "Suggested remediation ({}):\n{}\n\nEvidence: {}",
        resolution.solution.source, steps, sources
    )
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
        format!("{}…", cut.trim_end())
    }
}
