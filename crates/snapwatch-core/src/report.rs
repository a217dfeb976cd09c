//! Run reporting
//!
//! Collects per-job outcomes into a single plain-text report. Rendering
//! degrades in stages when a length budget is set: first diff bodies are
//! truncated, then dropped, then everything but the summary counts.

use std::fmt;

use crate::config::ReportConfig;
use crate::detector::Verdict;

const DETAIL_TRUNCATED_NOTE: &str = "[detail truncated]";

/// Per-job outcome as it appears in the report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    New,
    Changed,
    Unchanged,
    Error,
    /// The run deadline expired before this job started
    NotRun,
}

impl From<Verdict> for EntryStatus {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::New => Self::New,
            Verdict::Changed => Self::Changed,
            Verdict::Unchanged => Self::Unchanged,
            Verdict::Error => Self::Error,
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "NEW",
            Self::Changed => "CHANGED",
            Self::Unchanged => "UNCHANGED",
            Self::Error => "ERROR",
            Self::NotRun => "NOT RUN",
        };
        f.write_str(s)
    }
}

/// One job's line in the report
#[derive(Debug, Clone)]
pub struct ReportEntry {
    /// Job-list position, for stable report ordering
    pub ordinal: usize,
    pub job_name: String,
    pub location: String,
    pub status: EntryStatus,
    /// Diff body for changes, error message for failures
    pub detail: Option<String>,
    /// Outcome withheld by the job's error policy or failure threshold
    pub suppressed: bool,
}

/// All outcomes of one run, in job-list order
#[derive(Debug, Default)]
pub struct RunReport {
    entries: Vec<ReportEntry>,
}

impl RunReport {
    pub fn new(mut entries: Vec<ReportEntry>) -> Self {
        entries.sort_by_key(|e| e.ordinal);
        Self { entries }
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    /// Whether anything in the report warrants delivery
    pub fn is_noteworthy(&self) -> bool {
        self.entries.iter().any(|e| {
            !e.suppressed
                && matches!(
                    e.status,
                    EntryStatus::New | EntryStatus::Changed | EntryStatus::Error
                )
        })
    }

    fn visible<'a>(&'a self, config: &ReportConfig) -> Vec<&'a ReportEntry> {
        self.entries
            .iter()
            .filter(|e| !e.suppressed)
            .filter(|e| config.show_unchanged || e.status != EntryStatus::Unchanged)
            .collect()
    }

    /// Render status lines, with each detail body capped at `detail_limit`
    /// bytes (`None` omits the bodies entirely).
    fn render_entries(entries: &[&ReportEntry], detail_limit: Option<usize>) -> String {
        let mut out = String::new();
        for entry in entries {
            out.push_str(&format!(
                "{}: {} ({})\n",
                entry.status, entry.job_name, entry.location
            ));
            let Some(limit) = detail_limit else { continue };
            let Some(detail) = &entry.detail else { continue };
            if detail.is_empty() {
                continue;
            }
            if detail.len() > limit {
                let mut cut = limit;
                while !detail.is_char_boundary(cut) {
                    cut -= 1;
                }
                out.push_str(&detail[..cut]);
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(DETAIL_TRUNCATED_NOTE);
                out.push('\n');
            } else {
                out.push_str(detail);
                if !detail.ends_with('\n') {
                    out.push('\n');
                }
            }
            out.push('\n');
        }
        out
    }

    fn summary(&self) -> String {
        let count = |status| {
            self.entries
                .iter()
                .filter(|e| !e.suppressed && e.status == status)
                .count()
        };
        format!(
            "{} new, {} changed, {} unchanged, {} failed, {} not run\n",
            count(EntryStatus::New),
            count(EntryStatus::Changed),
            count(EntryStatus::Unchanged),
            count(EntryStatus::Error),
            count(EntryStatus::NotRun),
        )
    }

    /// Render the report as plain text.
    ///
    /// With a `max_length` budget, falls back in stages: full report, then
    /// detail bodies truncated to an even share of the remaining budget,
    /// then status lines without detail bodies, then the summary alone.
    /// Each fallback notes what was cut.
    pub fn render(&self, config: &ReportConfig) -> String {
        let visible = self.visible(config);
        if visible.is_empty() {
            return self.summary();
        }

        let full = format!(
            "{}\n{}",
            Self::render_entries(&visible, Some(usize::MAX)).trim_end(),
            self.summary()
        );
        let Some(max) = config.max_length else {
            return full;
        };
        if full.len() <= max {
            return full;
        }

        let skeleton = format!(
            "{}{}",
            Self::render_entries(&visible, None),
            self.summary()
        );
        let detailed = visible
            .iter()
            .filter(|e| e.detail.as_deref().is_some_and(|d| !d.is_empty()))
            .count();
        if detailed > 0 {
            // Each truncated body costs its limit plus the note and two
            // newlines; only attempt the stage when every body gets a
            // non-empty slice.
            let overhead = DETAIL_TRUNCATED_NOTE.len() + 3;
            let per_detail = max.saturating_sub(skeleton.len()) / detailed;
            if per_detail > overhead {
                let truncated = format!(
                    "{}\n{}",
                    Self::render_entries(&visible, Some(per_detail - overhead)).trim_end(),
                    self.summary()
                );
                if truncated.len() <= max {
                    return truncated;
                }
            }
        }

        let without_detail = format!(
            "[report too long, diff bodies omitted]\n{}{}",
            Self::render_entries(&visible, None),
            self.summary()
        );
        if without_detail.len() <= max {
            return without_detail;
        }

        format!("[report too long, entries omitted]\n{}", self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ordinal: usize, status: EntryStatus, detail: Option<&str>) -> ReportEntry {
        ReportEntry {
            ordinal,
            job_name: format!("job-{}", ordinal),
            location: format!("https://example.org/{}", ordinal),
            status,
            detail: detail.map(String::from),
            suppressed: false,
        }
    }

    fn config() -> ReportConfig {
        ReportConfig::default()
    }

    #[test]
    fn entries_render_in_ordinal_order() {
        let report = RunReport::new(vec![
            entry(3, EntryStatus::Changed, Some("diff-c")),
            entry(1, EntryStatus::New, None),
            entry(2, EntryStatus::Error, Some("boom")),
        ]);

        let text = report.render(&config());
        let pos = |needle: &str| text.find(needle).unwrap();
        assert!(pos("job-1") < pos("job-2"));
        assert!(pos("job-2") < pos("job-3"));
        assert!(text.contains("diff-c"));
        assert!(text.contains("boom"));
    }

    #[test]
    fn unchanged_entries_hidden_by_default() {
        let report = RunReport::new(vec![
            entry(1, EntryStatus::Unchanged, None),
            entry(2, EntryStatus::Changed, None),
        ]);

        let text = report.render(&config());
        assert!(!text.contains("UNCHANGED: job-1"));
        assert!(text.contains("CHANGED: job-2"));

        let show = ReportConfig {
            show_unchanged: true,
            ..ReportConfig::default()
        };
        assert!(report.render(&show).contains("UNCHANGED: job-1"));
    }

    #[test]
    fn suppressed_entries_never_render() {
        let mut suppressed = entry(1, EntryStatus::Error, Some("flaky"));
        suppressed.suppressed = true;
        let report = RunReport::new(vec![suppressed, entry(2, EntryStatus::New, None)]);

        let text = report.render(&config());
        assert!(!text.contains("flaky"));
        assert!(text.contains("NEW: job-2"));
        assert!(report.is_noteworthy());
    }

    #[test]
    fn length_budget_truncates_detail_before_dropping_it() {
        let big_diff = "x".repeat(500);
        let report = RunReport::new(vec![entry(1, EntryStatus::Changed, Some(&big_diff))]);

        let full = report.render(&config());
        assert!(full.contains(&big_diff));

        let budget = ReportConfig {
            max_length: Some(200),
            ..ReportConfig::default()
        };
        let text = report.render(&budget);
        assert!(text.len() <= 200);
        assert!(text.contains("CHANGED: job-1"));
        assert!(text.contains("xxx"), "a slice of the diff survives");
        assert!(text.contains("[detail truncated]"));
        assert!(!text.contains(&big_diff));
    }

    #[test]
    fn length_budget_drops_detail_then_entries() {
        let big_diff = "x".repeat(500);
        let report = RunReport::new(vec![
            entry(1, EntryStatus::Changed, Some(&big_diff)),
            entry(2, EntryStatus::Changed, Some(&big_diff)),
            entry(3, EntryStatus::Changed, Some(&big_diff)),
        ]);

        // Too tight to give every body a useful slice, but status lines fit
        let medium = ReportConfig {
            max_length: Some(220),
            ..ReportConfig::default()
        };
        let text = report.render(&medium);
        assert!(text.len() <= 220);
        assert!(text.contains("diff bodies omitted"));
        assert!(text.contains("CHANGED: job-1"));
        assert!(!text.contains("xxx"));

        let tiny = ReportConfig {
            max_length: Some(100),
            ..ReportConfig::default()
        };
        let text = report.render(&tiny);
        assert!(text.contains("entries omitted"));
        assert!(!text.contains("CHANGED: job-1"));
    }

    #[test]
    fn quiet_run_is_not_noteworthy() {
        let report = RunReport::new(vec![entry(1, EntryStatus::Unchanged, None)]);
        assert!(!report.is_noteworthy());
    }
}
