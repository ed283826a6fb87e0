//! Guard against "edits" that are disguised full-file rewrites.
//!
//! A capability asked for a small targeted change sometimes proposes
//! replacing most of the file instead, discarding unrelated work from
//! earlier sub-steps. Every edit passes through here before it is applied;
//! there is no bypass, including for edits labeled incremental.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Limits for a single old-code block. Rejection is strictly-greater-than:
/// a block at exactly `max_fraction` of the file is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffGuardConfig {
    /// Maximum fraction of the target file the old block may cover.
    pub max_fraction: f64,
    /// Maximum number of lines the old block may span.
    pub max_lines: usize,
}

impl Default for DiffGuardConfig {
    fn default() -> Self {
        Self {
            max_fraction: 0.30,
            max_lines: 50,
        }
    }
}

/// Proposed edit is large enough to constitute an effective rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffSafetyViolation {
    pub reason: String,
}

impl fmt::Display for DiffSafetyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "diff safety violation: {}", self.reason)
    }
}

impl std::error::Error for DiffSafetyViolation {}

/// Validate an old-code block against the file it would replace part of.
///
/// An empty target file is a create, not an edit, so the fraction rule does
/// not apply; the line cap on the old block still does.
pub fn validate_edit(
    old_block: &str,
    file_content: &str,
    config: &DiffGuardConfig,
) -> Result<(), DiffSafetyViolation> {
    let lines = line_span(old_block);
    if lines > config.max_lines {
        return Err(DiffSafetyViolation {
            reason: format!(
                "old code block spans {lines} lines (limit {})",
                config.max_lines
            ),
        });
    }

    if file_content.is_empty() {
        return Ok(());
    }

    let fraction = old_block.len() as f64 / file_content.len() as f64;
    if fraction > config.max_fraction {
        return Err(DiffSafetyViolation {
            reason: format!(
                "old code block covers {:.0}% of the file (limit {:.0}%), \
                 an effective full rewrite",
                fraction * 100.0,
                config.max_fraction * 100.0
            ),
        });
    }

    Ok(())
}

fn line_span(block: &str) -> usize {
    if block.is_empty() {
        return 0;
    }
    block.trim_end_matches('\n').lines().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_of_lines(n: usize) -> String {
        (0..n).map(|i| format!("line {i:03}\n")).collect()
    }

    #[test]
    fn small_block_in_large_file_is_accepted() {
        let file = file_of_lines(1000);
        let block = file_of_lines(10);
        validate_edit(&block, &file, &DiffGuardConfig::default()).expect("1% accepted");
    }

    #[test]
    fn sixty_percent_block_is_rejected_citing_percentage() {
        let file = file_of_lines(100);
        // Stay under the line cap so the fraction rule is what fires.
        let block: String = file.chars().take(file.len() * 60 / 100).collect();
        let config = DiffGuardConfig {
            max_lines: 1000,
            ..DiffGuardConfig::default()
        };
        let err = validate_edit(&block, &file, &config).expect_err("60% rejected");
        assert!(err.reason.contains("60%"), "reason: {}", err.reason);
    }

    #[test]
    fn exactly_thirty_percent_is_accepted() {
        let file = "aaaaaaaaaa"; // 10 bytes
        let block = "aaa"; // exactly 0.30
        validate_edit(block, file, &DiffGuardConfig::default()).expect("boundary accepted");
    }

    #[test]
    fn just_over_thirty_percent_is_rejected() {
        let file = "aaaaaaaaaa";
        let block = "aaaa"; // 0.40
        validate_edit(block, file, &DiffGuardConfig::default()).expect_err("over boundary");
    }

    #[test]
    fn block_over_line_cap_is_rejected_even_when_fraction_is_small() {
        let file = file_of_lines(10_000);
        let block = file_of_lines(51);
        let err =
            validate_edit(&block, &file, &DiffGuardConfig::default()).expect_err("51 lines");
        assert!(err.reason.contains("51 lines"));
    }

    #[test]
    fn fifty_line_block_passes_the_line_cap() {
        let file = file_of_lines(10_000);
        let block = file_of_lines(50);
        validate_edit(&block, &file, &DiffGuardConfig::default()).expect("50 lines ok");
    }

    #[test]
    fn empty_target_file_is_treated_as_create() {
        validate_edit("anything", "", &DiffGuardConfig::default()).expect("create");
    }
}
