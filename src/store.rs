//! JSON documents on disk: questions, languages, translations and scores.
//!
//! Translations and scores are nested maps keyed by question id, then language code.
//! Maps keep file order and records keep fields they do not know about, so a save of
//! unchanged data is byte-identical to the file it was loaded from.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(rename = "textEn")]
    pub text_en: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionsDocument {
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// Entry in the languages document, keyed by language code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Language {
    pub name: String,
    /// Scale description appended to a question before scoring
    #[serde(default)]
    pub prompt: String,
}

/// Keyed by language code, in file order
pub type Languages = IndexMap<String, Language>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRecord {
    pub text: String,
    pub back_translation: String,
    /// Back-translation fidelity, 1-5
    pub quality_score: u8,
    pub metadata: TranslationMetadata,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationMetadata {
    pub timestamp: String,
    pub model: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// 1-10, or [`SENTINEL_SCORE`] when no valid answer was elicited
    pub score: u8,
    pub metadata: ScoreMetadata,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreMetadata {
    pub timestamp: String,
    pub model: String,
    pub prompt: String,
    pub system_message: String,
    pub parameters: ScoreParameters,
    pub language_code: String,
    /// `None` only when every attempt failed before a response arrived
    pub response_id: Option<String>,
    pub raw_response: Option<String>,
    pub attempts: u32,
    /// Fields written by other tools, carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreParameters {
    pub temperature: f64,
    pub max_tokens: u32,
}

pub const SENTINEL_SCORE: u8 = 0;

pub type TranslationsDocument = IndexMap<String, IndexMap<String, TranslationRecord>>;
pub type ScoresDocument = IndexMap<String, IndexMap<String, ScoreRecord>>;

/// UTC timestamp in ISO-8601 with microseconds and no zone suffix
pub fn timestamp_now() -> String {
    Utc::now()
        .naive_utc()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

#[derive(Debug, Clone)]
pub struct DataStore {
    pub questions_file: PathBuf,
    pub languages_file: PathBuf,
    pub translations_file: PathBuf,
    pub scores_file: PathBuf,
}

impl DataStore {
    pub fn from_config(config: &Config) -> Self {
        Self {
            questions_file: config.questions_file.clone(),
            languages_file: config.languages_file.clone(),
            translations_file: config.translations_file.clone(),
            scores_file: config.scores_file.clone(),
        }
    }

    /// Store rooted in one directory using the default file names
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            questions_file: dir.join("questions.json"),
            languages_file: dir.join("languages.json"),
            translations_file: dir.join("translations.json"),
            scores_file: dir.join("scores.json"),
        }
    }

    pub fn load_questions(&self) -> Result<Vec<Question>> {
        let doc: QuestionsDocument = load_document(&self.questions_file)?;
        Ok(doc.questions)
    }

    pub fn load_languages(&self) -> Result<Languages> {
        load_document(&self.languages_file)
    }

    pub fn load_translations(&self) -> Result<TranslationsDocument> {
        load_document(&self.translations_file)
    }

    pub fn load_scores(&self) -> Result<ScoresDocument> {
        load_document(&self.scores_file)
    }

    pub fn save_translations(&self, translations: &TranslationsDocument) -> Result<()> {
        save_document(&self.translations_file, translations)
    }

    pub fn save_scores(&self, scores: &ScoresDocument) -> Result<()> {
        save_document(&self.scores_file, scores)
    }
}

/// Read a whole JSON document. A missing file yields the empty document.
pub fn load_document<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("File {} not found, starting with an empty document", path.display());
            return Ok(T::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    let doc = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    debug!("Loaded {}", path.display());
    Ok(doc)
}

/// Write a whole JSON document, pretty-printed with non-ASCII text kept literal.
/// Goes through a sibling temp file so a crash never leaves a truncated document.
pub fn save_document<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(doc).context("Failed to serialize document")?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    debug!("Saved {}", path.display());
    Ok(())
}
