//! Corpus model and loading
//!
//! A corpus is the full set of past incidents and knowledge-base articles that
//! the index is built from. Items are immutable once loaded; a changed corpus
//! is picked up by rebuilding the index, never by editing items in place.


use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::{AssistError, Result};

pub const INCIDENTS_FILE: &str = "incidents.json";
pub const KB_ARTICLES_FILE: &str = "kb_articles.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorpusKind {
    Incident,
    KbArticle,
}

impl CorpusKind {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incident => "incident",
            Self::KbArticle => "kb",
        }
    }
}

impl fmt::Display for CorpusKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CorpusKind {
    type Err = AssistError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "incident" | "incidents" => Ok(Self::Incident),
            "kb" | "kb_article" | "article" | "articles" => Ok(Self::KbArticle),
            other => Err(AssistError::InvalidRequest(format!(
                "Unknown corpus kind: {}",
                other
            ))),
        }
    }
}

/// Kind-specific content of a corpus item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorpusPayload {
    Incident { resolution: String },
    KbArticle { title: String, content: String },
}

/// A unit of retrievable knowledge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusItem {
    pub id: String,
    /// Display text; its cleaned form is what gets embedded
    pub text: String,
    pub payload: CorpusPayload,
    #[serde(default)]
    pub application: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    /// Incident root-cause category, used to map incidents to KB articles
    #[serde(default)]
    pub root_cause: Option<String>,
}

impl CorpusItem {
    #[inline]
    pub fn incident(
        id: impl Into<String>,
        description: impl Into<String>,
        resolution: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: description.into(),
            payload: CorpusPayload::Incident {
                resolution: resolution.into(),
            },
            application: None,
            severity: None,
            root_cause: None,
        }
    }

    /// KB articles are retrieved on their title and content together
    #[inline]
    pub fn kb_article(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let content = content.into();
        Self {
            id: id.into(),
            text: format!("{} {}", title, content),
            payload: CorpusPayload::KbArticle { title, content },
            application: None,
            severity: None,
            root_cause: None,
        }
    }

    #[inline]
    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.application = Some(application.into());
        self
    }

    #[inline]
    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }

    #[inline]
    pub fn with_root_cause(mut self, root_cause: impl Into<String>) -> Self {
        self.root_cause = Some(root_cause.into());
        self
    }

    #[inline]
    pub fn kind(&self) -> CorpusKind {
        match self.payload {
            CorpusPayload::Incident { .. } => CorpusKind::Incident,
            CorpusPayload::KbArticle { .. } => CorpusKind::KbArticle,
        }
    }

    #[inline]
    pub fn resolution(&self) -> Option<&str> {
        match &self.payload {
            CorpusPayload::Incident { resolution } => Some(resolution),
            CorpusPayload::KbArticle { .. } => None,
        }
    }

    #[inline]
    pub fn title(&self) -> Option<&str> {
        match &self.payload {
            CorpusPayload::KbArticle { title, .. } => Some(title),
            CorpusPayload::Incident { .. } => None,
        }
    }

    #[inline]
    pub fn content(&self) -> Option<&str> {
        match &self.payload {
            CorpusPayload::KbArticle { content, .. } => Some(content),
            CorpusPayload::Incident { .. } => None,
        }
    }

    /// The text handed to the embedding provider
    #[inline]
    pub fn embedding_input(&self) -> String {
        clean_text(&self.text)
    }
}

/// Lowercase and collapse runs of whitespace
#[inline]
pub fn clean_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Content-derived signature of a corpus.
///
/// Every field that reaches the index or a search result contributes, each
/// length-prefixed so that shifting bytes between fields changes the digest.
#[inline]
pub fn fingerprint(items: &[CorpusItem]) -> String {
    let mut hasher = Sha256::new();
    hasher.update((items.len() as u64).to_le_bytes());

    for item in items {
        hash_field(&mut hasher, item.kind().as_str());
        hash_field(&mut hasher, &item.id);
        hash_field(&mut hasher, &item.text);
        match &item.payload {
            CorpusPayload::Incident { resolution } => hash_field(&mut hasher, resolution),
            CorpusPayload::KbArticle { title, content } => {
                hash_field(&mut hasher, title);
                hash_field(&mut hasher, content);
            }
        }
        hash_field(&mut hasher, item.application.as_deref().unwrap_or(""));
        hash_field(&mut hasher, item.severity.as_deref().unwrap_or(""));
        hash_field(&mut hasher, item.root_cause.as_deref().unwrap_or(""));
    }

    hex::encode(hasher.finalize())
}

fn hash_field(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

/// Reject corpora where two items share an id
#[inline]
pub fn ensure_unique_ids(items: &[CorpusItem]) -> Result<()> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if !seen.insert(item.id.as_str()) {
            return Err(AssistError::Corpus(format!(
                "Duplicate corpus id: {}",
                item.id
            )));
        }
    }
    Ok(())
}

/// Supplies the full corpus on demand
pub trait CorpusSource: Send + Sync {
    fn load(&self) -> Result<Vec<CorpusItem>>;

    /// Short human-readable description used in logs and status output
    fn describe(&self) -> String;
}

/// In-memory corpus, replaced wholesale when it changes
#[derive(Debug, Default)]
pub struct StaticCorpus {
    items: RwLock<Vec<CorpusItem>>,
}

impl StaticCorpus {
    #[inline]
    pub fn new(items: Vec<CorpusItem>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    #[inline]
    pub fn replace(&self, items: Vec<CorpusItem>) {
        *self.items.write() = items;
    }
}

impl CorpusSource for StaticCorpus {
    fn load(&self) -> Result<Vec<CorpusItem>> {
        Ok(self.items.read().clone())
    }

    fn describe(&self) -> String {
        format!("in-memory corpus ({} items)", self.items.read().len())
    }
}

#[derive(Debug, Deserialize)]
struct IncidentRecord {
    incident_id: String,
    issue_description: String,
    #[serde(default)]
    resolution: String,
    #[serde(default)]
    application: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    root_cause: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KbArticleRecord {
    kb_id: String,
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    application: Option<String>,
}

/// Reads `incidents.json` and `kb_articles.json` from a corpus directory.
///
/// Either file may be absent, but not both. Incidents come first in corpus
/// order, followed by KB articles, each in file order.
#[derive(Debug, Clone)]
pub struct JsonCorpusSource {
    directory: PathBuf,
}

impl JsonCorpusSource {
    #[inline]
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    #[inline]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn read_records<T: DeserializeOwned>(&self, file: &str) -> Result<Option<Vec<T>>> {
        let path = self.directory.join(file);
        if !path.exists() {
            debug!("Corpus file not present: {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let records = serde_json::from_str(&content).map_err(|e| {
            AssistError::Corpus(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        Ok(Some(records))
    }
}

impl CorpusSource for JsonCorpusSource {
    fn load(&self) -> Result<Vec<CorpusItem>> {
        let incidents: Option<Vec<IncidentRecord>> = self.read_records(INCIDENTS_FILE)?;
        let articles: Option<Vec<KbArticleRecord>> = self.read_records(KB_ARTICLES_FILE)?;

        if incidents.is_none() && articles.is_none() {
            return Err(AssistError::Corpus(format!(
                "Neither {} nor {} found in {}",
                INCIDENTS_FILE,
                KB_ARTICLES_FILE,
                self.directory.display()
            )));
        }

        let mut items = Vec::new();

        for record in incidents.unwrap_or_default() {
            let mut item = CorpusItem::incident(
                record.incident_id,
                record.issue_description,
                record.resolution,
            );
            item.application = record.application;
            item.severity = record.severity;
            item.root_cause = record.root_cause;
            items.push(item);
        }

        for record in articles.unwrap_or_default() {
            let mut item = CorpusItem::kb_article(record.kb_id, record.title, record.content);
            item.application = record.application;
            items.push(item);
        }

        ensure_unique_ids(&items)?;

        info!(
            "Loaded {} corpus items from {}",
            items.len(),
            self.directory.display()
        );
        Ok(items)
    }

    fn describe(&self) -> String {
        self.directory.display().to_string()
    }
}
