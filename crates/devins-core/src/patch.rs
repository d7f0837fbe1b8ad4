//! Unified diff application for the `/patch` command

use crate::error::{Error, Result};

#[derive(Debug, PartialEq)]
struct Hunk {
    old_start: usize,
    lines: Vec<HunkLine>,
}

#[derive(Debug, PartialEq)]
enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

/// Apply a unified diff to `original`.
///
/// File headers (`---`, `+++`, `diff`, `index`) are ignored. Each hunk is
/// located at its stated line first and, failing that, by searching for its
/// context anywhere after the previous hunk.
pub fn apply_patch(original: &str, diff: &str) -> Result<String> {
    let hunks = parse_hunks(diff)?;
    if hunks.is_empty() {
        return Err(Error::Patch {
            message: "diff contains no hunks".to_string(),
        });
    }

    let trailing_newline = original.ends_with('\n');
    let mut lines: Vec<String> = original.lines().map(str::to_string).collect();
    let mut search_from = 0usize;
    let mut offset: isize = 0;

    for (number, hunk) in hunks.iter().enumerate() {
        let expected: Vec<&str> = hunk
            .lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Remove(s) => Some(s.as_str()),
                HunkLine::Add(_) => None,
            })
            .collect();
        let replacement: Vec<String> = hunk
            .lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Add(s) => Some(s.clone()),
                HunkLine::Remove(_) => None,
            })
            .collect();

        let stated = (hunk.old_start.saturating_sub(1) as isize + offset).max(0) as usize;
        let at = if matches_at(&lines, stated, &expected) {
            stated
        } else {
            (search_from..=lines.len().saturating_sub(expected.len()))
                .find(|&idx| matches_at(&lines, idx, &expected))
                .ok_or_else(|| Error::Patch {
                    message: format!("hunk {} does not match the file", number + 1),
                })?
        };

        let added = replacement.len();
        lines.splice(at..at + expected.len(), replacement);
        offset += added as isize - expected.len() as isize;
        search_from = at + added;
    }

    let mut out = lines.join("\n");
    if trailing_newline && !out.is_empty() {
        out.push('\n');
    }
    Ok(out)
}

fn matches_at(lines: &[String], at: usize, expected: &[&str]) -> bool {
    at + expected.len() <= lines.len()
        && lines[at..at + expected.len()]
            .iter()
            .zip(expected)
            .all(|(a, b)| a.trim_end() == b.trim_end())
}

fn parse_hunks(diff: &str) -> Result<Vec<Hunk>> {
    let mut hunks = Vec::new();
    let mut current: Option<Hunk> = None;

    for line in diff.lines() {
        if let Some(header) = line.strip_prefix("@@") {
            if let Some(hunk) = current.take() {
                hunks.push(hunk);
            }
            current = Some(Hunk {
                old_start: parse_old_start(header)?,
                lines: Vec::new(),
            });
            continue;
        }
        let Some(hunk) = current.as_mut() else {
            continue;
        };
        if line.starts_with("\\ No newline") {
            continue;
        }
        match line.chars().next() {
            Some('+') => hunk.lines.push(HunkLine::Add(line[1..].to_string())),
            Some('-') => hunk.lines.push(HunkLine::Remove(line[1..].to_string())),
            Some(' ') => hunk.lines.push(HunkLine::Context(line[1..].to_string())),
            None => hunk.lines.push(HunkLine::Context(String::new())),
            Some(_) => {
                return Err(Error::Patch {
                    message: format!("unexpected line in hunk: {line}"),
                });
            }
        }
    }
    if let Some(hunk) = current {
        hunks.push(hunk);
    }
    Ok(hunks)
}

/// `@@ -12,5 +12,6 @@` -> 12
fn parse_old_start(header: &str) -> Result<usize> {
    header
        .split_whitespace()
        .find_map(|part| part.strip_prefix('-'))
        .and_then(|range| range.split(',').next())
        .and_then(|start| start.parse().ok())
        .ok_or_else(|| Error::Patch {
            message: format!("malformed hunk header: @@{header}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_simple_hunk() {
        let original = "a\nb\nc\n";
        let diff = "--- a/f\n+++ b/f\n@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n";
        assert_eq!(apply_patch(original, diff).unwrap(), "a\nB\nc\n");
    }

    #[test]
    fn test_apply_with_wrong_line_numbers() {
        let original = "x\ny\na\nb\n";
        let diff = "@@ -1,2 +1,3 @@\n a\n+inserted\n b\n";
        assert_eq!(apply_patch(original, diff).unwrap(), "x\ny\na\ninserted\nb\n");
    }

    #[test]
    fn test_apply_multiple_hunks() {
        let original = "1\n2\n3\n4\n5\n6\n";
        let diff = "@@ -1,2 +1,2 @@\n-1\n+one\n 2\n@@ -5,2 +5,2 @@\n 5\n-6\n+six\n";
        assert_eq!(apply_patch(original, diff).unwrap(), "one\n2\n3\n4\n5\nsix\n");
    }

    #[test]
    fn test_mismatch_is_error() {
        let err = apply_patch("a\n", "@@ -1 +1 @@\n-zzz\n+y\n").unwrap_err();
        assert!(err.to_string().contains("hunk 1"));
    }

    #[test]
    fn test_no_hunks_is_error() {
        assert!(apply_patch("a\n", "just text").is_err());
    }
}
