//! Parser for `git status --porcelain=v1 --branch` output
//!
//! Pure functions, no I/O. Both the `-z` (NUL-separated) and the
//! newline-separated forms are accepted; the tracker always asks for `-z`.
//!
//! # Classification
//!
//! Each record carries a two-letter `XY` code (X = index, Y = worktree):
//!
//! | Code | Entries |
//! |------|---------|
//! | `??` | Untracked |
//! | `!!` | Ignored |
//! | `DD AU UD UA DU AA UU` | Conflict |
//! | X = `A`/`C`, `M`/`T`, `D`, `R` | Added, Staged, Removed, Renamed |
//! | Y = `M`/`T`, `D`, `A` | Modified, Deleted, Added |
//!
//! A record with both columns set yields two entries, index side first.
//! Anything else becomes a single `Unrecognized` entry.

use std::collections::HashSet;

use crate::error::{Result, TrackerError};
use crate::model::{Branch, BranchInfo, FileStatus, FileStatusEntry};

/// Structured result of one status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStatus {
    pub branch: Branch,
    pub entries: Vec<FileStatusEntry>,
    /// Records dropped because their path escapes the working tree or the
    /// record is too short to carry a code and a path
    pub skipped: usize,
}

const CONFLICT_CODES: [&str; 7] = ["DD", "AU", "UD", "UA", "DU", "AA", "UU"];

/// Parse raw status output (branch header plus file records)
pub fn parse_status(raw: &str) -> Result<ParsedStatus> {
    let nul_separated = raw.contains('\0');
    let separator = if nul_separated { '\0' } else { '\n' };
    // CRLF only matters for the newline form; with -z a trailing \r is part of the name
    let mut records = raw
        .split(separator)
        .map(|r| if nul_separated { r } else { r.trim_end_matches('\r') })
        .filter(|r| !r.is_empty());

    let mut branch = None;
    let mut entries = Vec::new();
    let mut seen = HashSet::new();
    let mut skipped = 0;

    while let Some(record) = records.next() {
        if let Some(header) = record.strip_prefix("## ") {
            branch = Some(parse_branch_header(header));
            continue;
        }

        let (code, path) = match split_record(record) {
            Some(parts) => parts,
            None => {
                tracing::warn!("[PARSE] Malformed status record: {:?}", record);
                skipped += 1;
                continue;
            }
        };

        // Renames and copies carry a second path: the next record with -z,
        // or "old -> new" in the newline form.
        let (path, original) = if code.contains(|c| c == 'R' || c == 'C') {
            if nul_separated {
                (path.to_string(), records.next().map(str::to_string))
            } else {
                match path.split_once(" -> ") {
                    Some((old, new)) => (unquote(new), Some(unquote(old))),
                    None => (unquote(path), None),
                }
            }
        } else if nul_separated {
            (path.to_string(), None)
        } else {
            (unquote(path), None)
        };

        if !is_contained(&path) || original.as_deref().is_some_and(|p| !is_contained(p)) {
            tracing::warn!("[PARSE] Skipping path outside working tree: {:?}", path);
            skipped += 1;
            continue;
        }

        for entry in parse_entry(code, &path, original.as_deref()) {
            if seen.insert((entry.path.clone(), entry.status)) {
                entries.push(entry);
            } else {
                tracing::debug!("[PARSE] Duplicate entry {:?} {}", entry.path, entry.status);
            }
        }
    }

    let branch = branch.ok_or_else(|| TrackerError::ParseFailure {
        message: "missing branch header in status output".to_string(),
    })?;

    Ok(ParsedStatus {
        branch,
        entries,
        skipped,
    })
}

/// Parse the text after `## ` in the branch header
///
/// Forms handled:
/// - `main`
/// - `main...origin/main [ahead 1, behind 2]`
/// - `main...origin/main [gone]`
/// - `No commits yet on main` / `Initial commit on main`
/// - `HEAD (no branch)`
pub fn parse_branch_header(header: &str) -> Branch {
    let header = header.trim();
    if header.starts_with("HEAD (no branch)") {
        return Branch::Detached;
    }

    let (refs, tracking) = match header.split_once(" [") {
        Some((refs, rest)) => (refs, Some(rest.trim_end_matches(']'))),
        None => (header, None),
    };

    let refs = refs
        .strip_prefix("No commits yet on ")
        .or_else(|| refs.strip_prefix("Initial commit on "))
        .unwrap_or(refs);

    let (name, upstream) = match refs.split_once("...") {
        Some((name, upstream)) => (name, Some(upstream.to_string())),
        None => (refs, None),
    };

    let mut info = BranchInfo {
        name: name.to_string(),
        has_upstream: upstream.is_some(),
        upstream,
        ahead: 0,
        behind: 0,
    };

    for part in tracking.into_iter().flat_map(|t| t.split(", ")) {
        let part = part.trim();
        if let Some(n) = part.strip_prefix("ahead ") {
            info.ahead = n.parse().unwrap_or(0);
        } else if let Some(n) = part.strip_prefix("behind ") {
            info.behind = n.parse().unwrap_or(0);
        } else if part == "gone" {
            info.has_upstream = false;
        }
    }

    Branch::Named(info)
}

/// Classify one record into its entries
///
/// `original` is only used for a staged rename.
pub fn parse_entry(code: &str, path: &str, original: Option<&str>) -> Vec<FileStatusEntry> {
    match classify(code) {
        Some(statuses) => statuses
            .into_iter()
            .map(|status| match (status, original) {
                (FileStatus::Renamed, Some(old)) => FileStatusEntry::renamed(path, old),
                _ => FileStatusEntry::new(path, status),
            })
            .collect(),
        None => {
            tracing::debug!("[PARSE] Unrecognized status code {:?} for {:?}", code, path);
            vec![FileStatusEntry::unrecognized(path, code)]
        }
    }
}

/// Map an `XY` code to one or two statuses, `None` when unknown
fn classify(code: &str) -> Option<Vec<FileStatus>> {
    match code {
        "??" => return Some(vec![FileStatus::Untracked]),
        "!!" => return Some(vec![FileStatus::Ignored]),
        c if CONFLICT_CODES.contains(&c) => return Some(vec![FileStatus::Conflict]),
        _ => {}
    }

    let mut chars = code.chars();
    let (x, y) = (chars.next()?, chars.next()?);

    let index = match x {
        ' ' => None,
        'A' | 'C' => Some(FileStatus::Added),
        'M' | 'T' => Some(FileStatus::Staged),
        'D' => Some(FileStatus::Removed),
        'R' => Some(FileStatus::Renamed),
        _ => return None,
    };
    let worktree = match y {
        ' ' => None,
        'M' | 'T' => Some(FileStatus::Modified),
        'D' => Some(FileStatus::Deleted),
        'A' => Some(FileStatus::Added),
        _ => return None,
    };

    let statuses: Vec<FileStatus> = index.into_iter().chain(worktree).collect();
    if statuses.is_empty() {
        None
    } else {
        Some(statuses)
    }
}

/// Split `XY path` into its code and path
fn split_record(record: &str) -> Option<(&str, &str)> {
    let code = record.get(..2)?;
    let rest = record.get(2..)?;
    let path = rest.strip_prefix(' ')?;
    if path.is_empty() {
        None
    } else {
        Some((code, path))
    }
}

/// Path stays inside the working tree
fn is_contained(path: &str) -> bool {
    !path.starts_with('/') && !path.split('/').any(|component| component == "..")
}

/// Undo git's C-style quoting of unusual paths (newline form only)
fn unquote(path: &str) -> String {
    let Some(inner) = path
        .strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
    else {
        return path.to_string();
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => bytes.push(b'\n'),
            Some('t') => bytes.push(b'\t'),
            Some('"') => bytes.push(b'"'),
            Some('\\') => bytes.push(b'\\'),
            Some(d @ '0'..='7') => {
                let mut value = d.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(digit) => {
                            value = value * 8 + digit;
                            chars.next();
                        }
                        None => break,
                    }
                }
                bytes.push(value as u8);
            }
            Some(other) => {
                bytes.push(b'\\');
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => bytes.push(b'\\'),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
