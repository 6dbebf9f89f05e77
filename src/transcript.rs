//! Plain-text log of every model exchange in a batch run, for humans only.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;

use crate::openai::{ChatCompletion, ChatError, ChatRequest};

pub struct Transcript {
    file: Mutex<Option<File>>,
}

impl Transcript {
    /// Start a fresh transcript, truncating any previous run's file
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create transcript {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(Some(file)),
        })
    }

    /// Transcript that discards everything
    pub fn disabled() -> Self {
        Self {
            file: Mutex::new(None),
        }
    }

    /// Append a titled block
    pub fn section(&self, title: &str, body: &str) {
        let mut guard = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(file) = guard.as_mut() else {
            return;
        };

        let rule = "=".repeat(title.len() + 8);
        let result = write!(file, "\n=== {} ===\n{}\n{}\n\n", title, body.trim_end(), rule)
            .and_then(|_| file.flush());
        if let Err(e) = result {
            warn!("Failed to write transcript section '{}': {}", title, e);
        }
    }

    pub fn request(&self, label: &str, request: &ChatRequest) {
        let json = serde_json::to_string_pretty(request).unwrap_or_default();
        self.section(
            "OpenAI API Call",
            &format!(
                "Label: {}\nSystem message: {}\nUser message: {}\n\nRequest JSON:\n{}",
                label,
                request.system_message(),
                request.user_message(),
                json
            ),
        );
    }

    pub fn response(&self, completion: &ChatCompletion) {
        let json = serde_json::to_string_pretty(&completion.raw).unwrap_or_default();
        self.section(
            "API Response",
            &format!(
                "Raw response content: {}\n\nFull response JSON:\n{}",
                completion.content, json
            ),
        );
    }

    pub fn error(&self, label: &str, error: &ChatError) {
        self.section("API Error", &format!("Label: {}\nError: {}", label, error));
    }
}
