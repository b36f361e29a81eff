//! change classification and content previews for diff output

use serde::Serialize;

use crate::types::{ChangeKind, FileDiff};

/// shown instead of a preview for binary content
pub const BINARY_PLACEHOLDER: &str = "[binary content]";

/// share of non-printable bytes above which content counts as binary
const BINARY_RATIO: f64 = 0.10;

/// how much of each side a preview keeps
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreviewLimits {
    pub lines: usize,
    pub chars: usize,
}

impl Default for PreviewLimits {
    fn default() -> Self {
        Self {
            lines: 5,
            chars: 200,
        }
    }
}

/// one changed file as reported to callers
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffChange {
    pub relative_path: String,
    pub change_type: ChangeKind,
    pub before_size: u64,
    pub after_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_preview: Option<String>,
}

/// change type from which sides exist, `None` if neither does
pub fn classify(before: Option<&[u8]>, after: Option<&[u8]>) -> Option<ChangeKind> {
    match (before, after) {
        (None, Some(_)) => Some(ChangeKind::Added),
        (Some(_), None) => Some(ChangeKind::Deleted),
        (Some(_), Some(_)) => Some(ChangeKind::Modified),
        (None, None) => None,
    }
}

/// null bytes or too many control characters
pub fn is_binary(content: &[u8]) -> bool {
    if content.is_empty() {
        return false;
    }
    if content.contains(&0) {
        return true;
    }

    let non_printable = content
        .iter()
        .filter(|&&b| (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r')) || b == 0x7f)
        .count();
    non_printable as f64 / content.len() as f64 > BINARY_RATIO
}

/// first lines of text content, truncated, with a note about what was cut
pub fn preview(content: &[u8], limits: PreviewLimits) -> String {
    if is_binary(content) {
        return BINARY_PLACEHOLDER.to_string();
    }

    let text = String::from_utf8_lossy(content);
    let lines: Vec<&str> = text.lines().collect();

    let mut out = lines
        .iter()
        .take(limits.lines)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");

    if out.chars().count() > limits.chars {
        out = out.chars().take(limits.chars).collect();
        out.push_str("...");
    }

    if lines.len() > limits.lines {
        out.push_str(&format!("\n... ({} more lines)", lines.len() - limits.lines));
    }
    out
}

/// build the caller-facing entry for one file diff
pub fn present(diff: &FileDiff, limits: PreviewLimits) -> Option<DiffChange> {
    let before = diff.before.as_deref();
    let after = diff.after.as_deref();
    let change_type = classify(before, after)?;

    Some(DiffChange {
        relative_path: diff.path.clone(),
        change_type,
        before_size: diff.before_bytes().len() as u64,
        after_size: diff.after_bytes().len() as u64,
        before_preview: before.map(|b| preview(b, limits)),
        after_preview: after.map(|a| preview(a, limits)),
    })
}
