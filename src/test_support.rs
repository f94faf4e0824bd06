use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::corpus::CorpusItem;
use crate::embeddings::EmbeddingProvider;
use crate::synthesis::{GenerationOptions, GenerativeProvider};
use crate::{AssistError, Result};

const VOCABULARY: &[&str] = &[
    "restart", "service", "down", "cache", "clear", "disk", "full", "latency", "slow", "login",
    "password", "payment", "gateway", "database", "vpn", "memory",
];

/// Bag-of-words embedder over a fixed vocabulary.
///
/// Texts sharing no vocabulary word embed to the zero vector. Any text
/// containing `fail_marker` fails to embed.
pub(crate) struct KeywordEmbedder {
    fail_marker: Option<String>,
    calls: AtomicUsize,
    delay: Duration,
}

impl KeywordEmbedder {
    pub(crate) fn new() -> Self {
        Self {
            fail_marker: None,
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_lowercase()),
            ..Self::new()
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let lowered = text.to_lowercase();
        if let Some(marker) = &self.fail_marker {
            if lowered.contains(marker.as_str()) {
                return Err(AssistError::Embedding(format!("cannot embed {}", text)));
            }
        }

        let mut vector = vec![0.0; VOCABULARY.len()];
        for token in lowered.split(|c: char| !c.is_alphanumeric()) {
            if let Some(position) = VOCABULARY.iter().position(|word| *word == token) {
                vector[position] += 1.0;
            }
        }
        Ok(vector)
    }
}

/// Generator returning a canned completion or failure
pub(crate) struct ScriptedGenerator {
    reply: std::result::Result<String, String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub(crate) fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GenerativeProvider for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted-test"
    }

    fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.reply.clone().map_err(AssistError::Generation)
    }
}

pub(crate) fn sample_corpus() -> Vec<CorpusItem> {
    vec![
        CorpusItem::incident("INC1", "Payment service down", "Restart service A")
            .with_application("payments")
            .with_severity("P1"),
        CorpusItem::incident("INC2", "Checkout latency slow", "Clear cache B"),
        CorpusItem::kb_article("KB1", "Disk full", "Clear old logs from the disk"),
        CorpusItem::kb_article("KB2", "Login password reset", "Reset the password in the portal"),
    ]
}
