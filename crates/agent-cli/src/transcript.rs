//! Markdown transcript of completed turns.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use agent_core::TurnSummary;

pub struct Transcript {
    path: PathBuf,
}

impl Transcript {
    /// Create parent directories and touch the file.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_turn(&self, user: &str, summary: &TurnSummary) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(render_turn(user, summary).as_bytes())
    }
}

pub fn render_turn(user: &str, summary: &TurnSummary) -> String {
    let mut entry = format!("\n### turn\n**You:** {}\n\n**AI:** {}\n", user, summary.text);
    if let Some(tool) = &summary.last_tool {
        entry.push_str(&format!(
            "\n_Tool used_: {}\n_Input bytes_: {}\n_Output_: {}\n",
            tool,
            summary.last_tool_input_len,
            summary.last_tool_output_preview.as_deref().unwrap_or_default()
        ));
    }
    entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn plain_turn_has_no_tool_section() {
        let summary = TurnSummary {
            text: "Hello!".to_string(),
            ..TurnSummary::default()
        };
        assert_eq!(
            render_turn("hi", &summary),
            "\n### turn\n**You:** hi\n\n**AI:** Hello!\n"
        );
    }

    #[test]
    fn turns_are_appended_with_tool_details() {
        let dir = TempDir::new().unwrap();
        let transcript = Transcript::open(dir.path().join("logs/memory.md")).unwrap();

        let summary = TurnSummary {
            text: "It is 42.".to_string(),
            tool_calls: 1,
            last_tool: Some("script_eval".to_string()),
            last_tool_input_len: 27,
            last_tool_output_preview: Some(r#"{"stdout":"42"}"#.to_string()),
        };
        transcript.append_turn("compute", &summary).unwrap();
        transcript.append_turn("again", &TurnSummary::default()).unwrap();

        let text = std::fs::read_to_string(transcript.path()).unwrap();
        assert!(text.contains("_Tool used_: script_eval\n_Input bytes_: 27\n_Output_: {\"stdout\":\"42\"}\n"));
        assert_eq!(text.matches("### turn").count(), 2);
    }
}
