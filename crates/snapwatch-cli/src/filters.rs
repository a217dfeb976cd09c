//! Built-in content filters
//!
//! Small pure transformations applied between acquisition and change
//! detection. Line matching is plain substring matching; anything fancier
//! belongs in an external command run through the exec source.

use snapwatch_core::traits::ContentFilter;
use snapwatch_core::AcquireError;

/// Trim each line and drop leading/trailing blank lines
pub struct StripWhitespace;

impl ContentFilter for StripWhitespace {
    fn name(&self) -> &str {
        "strip_whitespace"
    }

    fn apply(&self, content: String) -> Result<String, AcquireError> {
        let lines: Vec<&str> = content.lines().map(str::trim).collect();
        let start = lines
            .iter()
            .position(|l| !l.is_empty())
            .unwrap_or(lines.len());
        let end = lines
            .iter()
            .rposition(|l| !l.is_empty())
            .map(|i| i + 1)
            .unwrap_or(start);

        let mut out = lines[start..end].join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        Ok(out)
    }
}

/// Sort lines lexicographically; stabilizes sources that shuffle entries
pub struct SortLines;

impl ContentFilter for SortLines {
    fn name(&self) -> &str {
        "sort_lines"
    }

    fn apply(&self, content: String) -> Result<String, AcquireError> {
        let mut lines: Vec<&str> = content.lines().collect();
        lines.sort_unstable();
        let mut out = lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        Ok(out)
    }
}

/// Keep only lines containing the pattern
pub struct KeepLines {
    pattern: String,
}

impl KeepLines {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

impl ContentFilter for KeepLines {
    fn name(&self) -> &str {
        "keep_lines"
    }

    fn apply(&self, content: String) -> Result<String, AcquireError> {
        let mut out: String = content
            .lines()
            .filter(|l| l.contains(&self.pattern))
            .map(|l| format!("{}\n", l))
            .collect();
        if out.is_empty() {
            // An empty selection usually means the page layout changed;
            // surface it instead of reporting content that vanished
            return Err(AcquireError::filter(
                self.name(),
                format!("no lines match '{}'", self.pattern),
            ));
        }
        out.shrink_to_fit();
        Ok(out)
    }
}

/// Drop lines containing the pattern
pub struct DropLines {
    pattern: String,
}

impl DropLines {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

impl ContentFilter for DropLines {
    fn name(&self) -> &str {
        "drop_lines"
    }

    fn apply(&self, content: String) -> Result<String, AcquireError> {
        Ok(content
            .lines()
            .filter(|l| !l.contains(&self.pattern))
            .map(|l| format!("{}\n", l))
            .collect())
    }
}
