//! Extraction of executable steps from model-authored text.
//!
//! Fenced code blocks are the unit. Each block gets a language (from its tag,
//! or sniffed from its content), an optional filename (inline `# name.py`
//! comment first, then "save/create ... `name`" phrasing in the prose, in
//! order) and an execute flag. Identical blocks collapse to one step.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

static FENCED_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:([\w+-]+)?\n)?(.*?)```").expect("fenced block regex is valid")
});

static PROSE_FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:save|create).+?`([^`]+)`").expect("prose filename regex is valid")
});

static EXECUTE_HINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:run|execute).+?`?([^`\n]+)`?").expect("execute hint regex is valid")
});

static INLINE_FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"#\s*(\w+\.(?:py|sh|bash))\b").expect("inline filename regex is valid")
});

static SHELL_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:sudo|apt|cd|ls|rm|mv|touch|python|bash)\b").expect("shell token regex is valid")
});

/// Substrings that make a shell block worth running on its own.
const SHELL_RUNNERS: &[&str] = &["python", "bash", "./", "apt", "pip", "make"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepLanguage {
    Python,
    Bash,
}

impl StepLanguage {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "python" | "py" | "python3" => Some(Self::Python),
            "bash" | "sh" | "shell" | "zsh" => Some(Self::Bash),
            _ => None,
        }
    }

    /// Content sniffing for untagged blocks.
    pub fn detect(content: &str) -> Option<Self> {
        let first_line = content.lines().next().unwrap_or_default();
        if first_line.starts_with("#!") && first_line.contains("python") {
            return Some(Self::Python);
        }
        if content.contains("import") && content.contains("def") {
            return Some(Self::Python);
        }
        if content.contains("#!/bin/bash") || SHELL_TOKEN_RE.is_match(content) {
            return Some(Self::Bash);
        }
        None
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Python => "py",
            Self::Bash => "sh",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutableStep {
    pub content: String,
    pub language: StepLanguage,
    pub filename: Option<String>,
    pub execute: bool,
    /// Hex SHA-256 of `content`; the step's identity.
    pub hash: String,
}

pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

pub fn extract_steps(text: &str) -> Vec<ExecutableStep> {
    let prose_filenames: Vec<String> = PROSE_FILENAME_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    let execute_hints: Vec<String> = EXECUTE_HINT_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .collect();

    let mut seen = HashSet::new();
    let mut next_prose_filename = 0;
    let mut steps = Vec::new();

    for captures in FENCED_BLOCK_RE.captures_iter(text) {
        let content = captures
            .get(2)
            .map(|m| m.as_str().trim())
            .unwrap_or_default();
        if content.is_empty() {
            continue;
        }

        let language = match captures.get(1) {
            Some(tag) => StepLanguage::from_tag(tag.as_str()),
            None => StepLanguage::detect(content),
        };
        let Some(language) = language else {
            log::debug!("skipping code block without a runnable language");
            continue;
        };

        let hash = content_hash(content);
        if !seen.insert(hash.clone()) {
            continue;
        }

        let filename = match INLINE_FILENAME_RE.captures(content).and_then(|c| c.get(1)) {
            Some(name) => Some(name.as_str().to_string()),
            None => {
                let name = prose_filenames.get(next_prose_filename).cloned();
                if name.is_some() {
                    next_prose_filename += 1;
                }
                name
            }
        };

        let hinted = filename
            .as_deref()
            .is_some_and(|name| execute_hints.iter().any(|hint| hint.contains(name)));
        let runs_tools = language == StepLanguage::Bash && {
            let lowered = content.to_lowercase();
            SHELL_RUNNERS.iter().any(|runner| lowered.contains(runner))
        };

        steps.push(ExecutableStep {
            content: content.to_string(),
            language,
            filename,
            execute: hinted || runs_tools,
            hash,
        });
    }

    if let [only] = steps.as_mut_slice() {
        only.execute = true;
    }

    steps
}
