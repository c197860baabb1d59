use crate::error::Result;
use crate::models::ModelEntity;
use similar::{ChangeTag, TextDiff};

/// Line diff between two versions of an entity's JSON.
#[derive(Debug, Clone)]
pub struct ModelDiff {
    pub path: String,
    pub old_content: Option<String>,
    pub new_content: Option<String>,
    pub diff_lines: Vec<DiffLine>,
}

#[derive(Debug, Clone)]
pub struct DiffLine {
    pub line_type: DiffLineType,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLineType {
    Context,
    Addition,
    Deletion,
}

impl ModelDiff {
    /// Either side may be missing for added or deleted entities.
    pub fn between(path: &str, before: Option<&ModelEntity>, after: Option<&ModelEntity>) -> Result<Self> {
        let old_content = before.map(pretty).transpose()?;
        let new_content = after.map(pretty).transpose()?;

        let diff_lines = Self::compute_diff(
            old_content.as_deref().unwrap_or(""),
            new_content.as_deref().unwrap_or(""),
        );

        Ok(ModelDiff {
            path: path.to_string(),
            old_content,
            new_content,
            diff_lines,
        })
    }

    fn compute_diff(old_text: &str, new_text: &str) -> Vec<DiffLine> {
        TextDiff::from_lines(old_text, new_text)
            .iter_all_changes()
            .map(|change| DiffLine {
                line_type: match change.tag() {
                    ChangeTag::Delete => DiffLineType::Deletion,
                    ChangeTag::Insert => DiffLineType::Addition,
                    ChangeTag::Equal => DiffLineType::Context,
                },
                content: change.to_string(),
            })
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        self.diff_lines
            .iter()
            .any(|l| l.line_type != DiffLineType::Context)
    }
}

fn pretty(entity: &ModelEntity) -> Result<String> {
    let mut text = serde_json::to_string_pretty(entity)?;
    text.push('\n');
    Ok(text)
}
