//! Line-oriented diffing
//!
//! A Myers shortest-edit-script diff over lines, used both to size the
//! change between two contents (baseline selection) and to render a unified
//! diff for reports. The edit-distance search is capped; beyond the cap the
//! diff degrades to a whole-file replacement, which keeps memory bounded on
//! pathological inputs.

use std::process::Stdio;
use tokio::process::Command;

use crate::config::DiffMode;
use crate::error::{Error, Result};

/// Give up on the shortest-script search beyond this edit distance
const MYERS_MAX_D: usize = 2000;

/// One line-level edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOp {
    Keep(String),
    Delete(String),
    Insert(String),
}

/// Myers shortest edit script between two line sequences.
///
/// Falls back to delete-all-insert-all when the edit distance exceeds the
/// internal cap.
pub fn diff_lines(old: &str, new: &str) -> Vec<DiffOp> {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();
    let (n, m) = (a.len(), b.len());

    if n == 0 && m == 0 {
        return Vec::new();
    }

    let max_d = (n + m).min(MYERS_MAX_D);
    let offset = max_d;
    // v[k + offset] = furthest x on diagonal k
    let mut v = vec![0usize; 2 * max_d + 1];
    // One copy of v per d, for backtracking
    let mut trace: Vec<Vec<usize>> = Vec::new();

    let mut found_d = None;
    'outer: for d in 0..=max_d {
        trace.push(v.clone());
        let mut k = -(d as isize);
        while k <= d as isize {
            let ki = (k + offset as isize) as usize;
            let mut x = if k == -(d as isize)
                || (k != d as isize && v[ki - 1] < v[ki + 1])
            {
                v[ki + 1]
            } else {
                v[ki - 1] + 1
            };
            let mut y = (x as isize - k) as usize;
            while x < n && y < m && a[x] == b[y] {
                x += 1;
                y += 1;
            }
            v[ki] = x;
            if x >= n && y >= m {
                found_d = Some(d);
                break 'outer;
            }
            k += 2;
        }
    }

    let Some(found_d) = found_d else {
        // Distance cap hit: whole-file replacement
        let mut ops = Vec::with_capacity(n + m);
        ops.extend(a.iter().map(|l| DiffOp::Delete((*l).to_string())));
        ops.extend(b.iter().map(|l| DiffOp::Insert((*l).to_string())));
        return ops;
    };

    // Backtrack from (n, m) through the recorded frontiers
    let mut ops_rev = Vec::new();
    let (mut x, mut y) = (n, m);
    for d in (1..=found_d).rev() {
        let v = &trace[d];
        let k = x as isize - y as isize;
        let ki = (k + offset as isize) as usize;

        let down = k == -(d as isize) || (k != d as isize && v[ki - 1] < v[ki + 1]);
        let prev_k = if down { k + 1 } else { k - 1 };
        let prev_x = v[(prev_k + offset as isize) as usize];
        let prev_y = (prev_x as isize - prev_k) as usize;

        while x > prev_x && y > prev_y {
            x -= 1;
            y -= 1;
            ops_rev.push(DiffOp::Keep(a[x].to_string()));
        }
        if down {
            y -= 1;
            ops_rev.push(DiffOp::Insert(b[y].to_string()));
        } else {
            x -= 1;
            ops_rev.push(DiffOp::Delete(a[x].to_string()));
        }
    }
    while x > 0 && y > 0 {
        x -= 1;
        y -= 1;
        ops_rev.push(DiffOp::Keep(a[x].to_string()));
    }

    ops_rev.reverse();
    ops_rev
}

/// Number of changed lines between two contents (insertions plus deletions)
pub fn diff_size(old: &str, new: &str) -> usize {
    diff_lines(old, new)
        .iter()
        .filter(|op| !matches!(op, DiffOp::Keep(_)))
        .count()
}

/// Render a unified diff with `context` lines of context around each hunk
pub fn render_unified(
    old: &str,
    new: &str,
    old_label: &str,
    new_label: &str,
    context: usize,
) -> String {
    let ops = diff_lines(old, new);
    if !ops.iter().any(|op| !matches!(op, DiffOp::Keep(_))) {
        return String::new();
    }

    // Hunks: maximal op ranges where changes are at most 2*context apart
    let change_idx: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| !matches!(op, DiffOp::Keep(_)))
        .map(|(i, _)| i)
        .collect();

    let mut hunks: Vec<(usize, usize)> = Vec::new();
    for &i in &change_idx {
        let start = i.saturating_sub(context);
        let end = (i + context + 1).min(ops.len());
        match hunks.last_mut() {
            Some((_, last_end)) if start <= *last_end => *last_end = end,
            _ => hunks.push((start, end)),
        }
    }

    // Line numbers of each op in old/new coordinates (1-based starts)
    let mut old_line = 1usize;
    let mut new_line = 1usize;
    let mut positions = Vec::with_capacity(ops.len());
    for op in &ops {
        positions.push((old_line, new_line));
        match op {
            DiffOp::Keep(_) => {
                old_line += 1;
                new_line += 1;
            }
            DiffOp::Delete(_) => old_line += 1,
            DiffOp::Insert(_) => new_line += 1,
        }
    }

    let mut out = String::new();
    out.push_str(&format!("--- {}\n", old_label));
    out.push_str(&format!("+++ {}\n", new_label));

    for &(start, end) in &hunks {
        let (old_start, new_start) = positions[start];
        let old_count = ops[start..end]
            .iter()
            .filter(|op| !matches!(op, DiffOp::Insert(_)))
            .count();
        let new_count = ops[start..end]
            .iter()
            .filter(|op| !matches!(op, DiffOp::Delete(_)))
            .count();

        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            old_start, old_count, new_start, new_count
        ));
        for op in &ops[start..end] {
            match op {
                DiffOp::Keep(line) => {
                    out.push(' ');
                    out.push_str(line);
                }
                DiffOp::Delete(line) => {
                    out.push('-');
                    out.push_str(line);
                }
                DiffOp::Insert(line) => {
                    out.push('+');
                    out.push_str(line);
                }
            }
            out.push('\n');
        }
    }

    out
}

/// Reduce a rendered unified diff per the requested mode
pub fn filter_lines(diff: &str, mode: DiffMode) -> String {
    match mode {
        DiffMode::Full => diff.to_string(),
        DiffMode::AdditionsOnly => diff
            .lines()
            .filter(|l| {
                l.starts_with('+') || l.starts_with("@@") || l.starts_with("--- ")
            })
            .map(|l| format!("{}\n", l))
            .collect(),
        DiffMode::DeletionsOnly => diff
            .lines()
            .filter(|l| {
                (l.starts_with('-') && !l.starts_with("--- ")) || l.starts_with("@@")
            })
            .map(|l| format!("{}\n", l))
            .collect(),
    }
}

/// Run an external diff command over the two contents.
///
/// The command receives the old and new file paths as its final two
/// arguments. Exit status 0 or 1 is success (1 means "differences found" for
/// diff-like tools); anything else is an error.
pub async fn external_diff(tool: &str, old: &str, new: &str) -> Result<String> {
    let dir = tempfile::tempdir()
        .map_err(|e| Error::diff_tool(format!("cannot create temp directory: {}", e)))?;
    let old_path = dir.path().join("old");
    let new_path = dir.path().join("new");
    tokio::fs::write(&old_path, old).await?;
    tokio::fs::write(&new_path, new).await?;

    let mut parts = tool.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| Error::diff_tool("empty diff tool command"))?;

    let output = Command::new(program)
        .args(parts)
        .arg(&old_path)
        .arg(&new_path)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::diff_tool(format!("cannot run '{}': {}", tool, e)))?;

    match output.status.code() {
        Some(0) | Some(1) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
        code => Err(Error::diff_tool(format!(
            "'{}' exited with {:?}: {}",
            tool,
            code,
            String::from_utf8_lossy(&output.stderr).trim()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_contents_produce_no_diff() {
        assert_eq!(diff_size("a\nb\nc", "a\nb\nc"), 0);
        assert!(render_unified("a\nb", "a\nb", "old", "new", 3).is_empty());
    }

    #[test]
    fn single_line_change_sizes_as_two() {
        // One deletion plus one insertion
        assert_eq!(diff_size("a\nb\nc", "a\nX\nc"), 2);
    }

    #[test]
    fn pure_insertion_and_deletion() {
        assert_eq!(diff_size("a\nc", "a\nb\nc"), 1);
        assert_eq!(diff_size("a\nb\nc", "a\nc"), 1);
        assert_eq!(diff_size("", "a\nb"), 2);
    }

    #[test]
    fn unified_render_carries_labels_and_markers() {
        let diff = render_unified("a\nb\nc", "a\nX\nc", "old @ 10", "new @ 20", 3);
        assert!(diff.starts_with("--- old @ 10\n+++ new @ 20\n"));
        assert!(diff.contains("-b\n"));
        assert!(diff.contains("+X\n"));
        assert!(diff.contains(" a\n"));
    }

    #[test]
    fn context_limits_hunk_extent() {
        let old = "1\n2\n3\n4\n5\n6\n7\n8\n9";
        let new = "1\n2\n3\n4\nX\n6\n7\n8\n9";
        let diff = render_unified(old, new, "old", "new", 1);
        assert!(diff.contains(" 4\n-5\n+X\n 6\n"));
        assert!(!diff.contains(" 2\n"));
        assert!(!diff.contains(" 8\n"));
    }

    #[test]
    fn distant_changes_become_separate_hunks() {
        let old = "1\n2\n3\n4\n5\n6\n7\n8\n9\n10";
        let new = "X\n2\n3\n4\n5\n6\n7\n8\n9\nY";
        let diff = render_unified(old, new, "old", "new", 1);
        assert_eq!(diff.matches("@@").count() / 2, 2);
    }

    #[test]
    fn additions_only_drops_deletions() {
        let diff = render_unified("a\nb", "a\nc", "old", "new", 3);
        let filtered = filter_lines(&diff, DiffMode::AdditionsOnly);
        assert!(filtered.contains("+c"));
        assert!(!filtered.contains("-b"));
    }

    #[test]
    fn deletions_only_drops_additions() {
        let diff = render_unified("a\nb", "a\nc", "old", "new", 3);
        let filtered = filter_lines(&diff, DiffMode::DeletionsOnly);
        assert!(filtered.contains("-b"));
        assert!(!filtered.contains("+c"));
        assert!(!filtered.contains("--- old"));
    }

    #[tokio::test]
    async fn external_diff_accepts_difference_exit_status() {
        let out = external_diff("diff -u", "a\n", "b\n").await.unwrap();
        assert!(out.contains("-a"));
        assert!(out.contains("+b"));
    }

    #[tokio::test]
    async fn external_diff_reports_missing_tool() {
        let err = external_diff("definitely-not-a-real-tool-xyz", "a", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DiffTool(_)));
    }
}
