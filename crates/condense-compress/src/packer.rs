//! Budget-aware line packer, the terminal compression stage
//!
//! Works on text lines only, so it needs no collaborator and cannot fail.

use condense_core::{PrioritySections, SectionKind};
use condense_telemetry::TokenEstimator;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Share of the estimated char budget used by hard truncation
const TRUNCATION_MARGIN: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct PackOptions {
    pub budget: usize,
    pub priority: PrioritySections,
    /// Lines shorter than this (in chars) are always kept
    pub short_line_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackResult {
    pub text: String,
    pub tokens: usize,
    pub kept_lines: usize,
    pub dropped_lines: usize,
    pub truncated: bool,
}

static SECTION_TAG_RE: OnceLock<Regex> = OnceLock::new();

/// Section opened and closed on a line, if any
fn section_tags(line: &str) -> (Option<SectionKind>, bool) {
    let re = SECTION_TAG_RE.get_or_init(|| {
        Regex::new(r"<(/?)(BACKGROUND|PLAN|SUB_APP|HISTORY)\s*(/?)>").unwrap()
    });
    let mut opened = None;
    let mut closed = false;
    for cap in re.captures_iter(line) {
        let Ok(kind) = cap[2].parse::<SectionKind>() else { continue };
        if !cap[1].is_empty() || !cap[3].is_empty() {
            closed = true;
        } else {
            opened = Some(kind);
            closed = false;
        }
    }
    (opened, closed)
}

fn is_structural(line: &str, short_line_chars: usize) -> bool {
    (line.starts_with('<') && line.ends_with('>'))
        || line.contains("role=")
        || line.starts_with("<?xml")
        || line.chars().count() < short_line_chars
}

fn names_priority_section(line: &str, priority: &PrioritySections) -> bool {
    match priority {
        PrioritySections::All => true,
        PrioritySections::Only(kinds) => {
            let upper = line.to_uppercase();
            kinds.iter().any(|k| upper.contains(k.tag()))
        }
    }
}

fn join_kept(lines: &[&str], keep: &[bool]) -> String {
    lines
        .iter()
        .zip(keep)
        .filter(|(_, &k)| k)
        .map(|(l, _)| *l)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Shrink `text` towards `options.budget` tokens by dropping long body
/// lines from priority sections, then hard-truncating if still over
pub fn pack(text: &str, options: &PackOptions, estimator: &dyn TokenEstimator) -> PackResult {
    let original_tokens = estimator.estimate(text);
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if original_tokens <= options.budget {
        return PackResult {
            text: text.to_string(),
            tokens: original_tokens,
            kept_lines: lines.len(),
            dropped_lines: 0,
            truncated: false,
        };
    }

    let mut keep = vec![true; lines.len()];
    let mut eligible = Vec::new();
    let mut current: Option<SectionKind> = None;
    for (idx, line) in lines.iter().enumerate() {
        let (opened, closed) = section_tags(line);
        if opened.is_some() {
            current = opened;
        }
        let in_priority = current.is_some_and(|k| options.priority.contains(k));
        if !is_structural(line, options.short_line_chars)
            && (in_priority || names_priority_section(line, &options.priority))
        {
            keep[idx] = false;
            eligible.push(idx);
        }
        if closed {
            current = None;
        }
    }

    // Longest first; stable so equal lengths keep document order
    eligible.sort_by_key(|&idx| std::cmp::Reverse(lines[idx].chars().count()));
    for &idx in &eligible {
        keep[idx] = true;
        // Joiners and rounding make per-line costs non-additive, so measure
        // the assembled text
        if estimator.estimate(&join_kept(&lines, &keep)) > options.budget {
            keep[idx] = false;
            break;
        }
    }

    let kept_lines = keep.iter().filter(|&&k| k).count();
    let mut packed = join_kept(&lines, &keep);
    let mut tokens = estimator.estimate(&packed);
    let mut truncated = false;

    if tokens > options.budget {
        let chars = packed.chars().count();
        let chars_per_token = chars as f64 / tokens as f64;
        let limit = (options.budget as f64 * chars_per_token * TRUNCATION_MARGIN).floor() as usize;
        packed = packed.chars().take(limit).collect();
        tokens = estimator.estimate(&packed);
        truncated = true;
        tracing::warn!(budget = options.budget, tokens, "packed text still over budget, truncated");
    }

    tracing::debug!(
        original_tokens,
        tokens,
        kept_lines,
        dropped = lines.len() - kept_lines,
        "packed text"
    );

    PackResult {
        text: packed,
        tokens,
        kept_lines,
        dropped_lines: lines.len() - kept_lines,
        truncated,
    }
}
