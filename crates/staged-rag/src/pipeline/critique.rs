//! Critique verdict parsing

/// Evaluator decision carried on the first line of a critique
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    NeedsImprovement,
}

impl Verdict {
    /// Read the verdict from the first non-blank line of a critique.
    ///
    /// Markdown emphasis and a leading `Verdict:` are ignored. Anything other
    /// than an explicit approval counts as needing improvement.
    pub fn parse(critique: &str) -> Self {
        let Some(first) = critique.lines().map(str::trim).find(|line| !line.is_empty()) else {
            return Self::NeedsImprovement;
        };

        let line = first
            .trim_matches(|c: char| matches!(c, '*' | '#' | '_' | '`') || c.is_whitespace())
            .to_ascii_uppercase();
        let line = line
            .strip_prefix("VERDICT:")
            .map(str::trim_start)
            .unwrap_or(line.as_str())
            .trim_start_matches(|c: char| matches!(c, '*' | '_') || c.is_whitespace());

        if line.starts_with("APPROVED") {
            Self::Approved
        } else {
            Self::NeedsImprovement
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}
