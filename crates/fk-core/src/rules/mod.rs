//! Rule model and line classification
//!
//! One filter-list line becomes a [`Rule`]: either a network rule or a
//! cosmetic rule. Comments and empty lines classify to `None`; anything that
//! fails to parse is a [`RuleSyntaxError`] the scanner absorbs.

pub mod cookie;
pub mod cosmetic;
pub mod network;

use crate::error::RuleSyntaxError;

pub use cookie::CookieModifier;
pub use cosmetic::{CosmeticRule, CosmeticRuleKind};
pub use network::{NetworkRule, NetworkRuleFlags};

/// A parsed filter rule.
#[derive(Debug, Clone)]
pub enum Rule {
    Network(NetworkRule),
    Cosmetic(CosmeticRule),
}

impl Rule {
    pub fn filter_list_id(&self) -> u32 {
        match self {
            Rule::Network(rule) => rule.filter_list_id,
            Rule::Cosmetic(rule) => rule.filter_list_id,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Rule::Network(rule) => &rule.text,
            Rule::Cosmetic(rule) => &rule.text,
        }
    }
}

/// A rule plus the index assigned to it by storage.
#[derive(Debug, Clone)]
pub struct IndexedRule {
    pub rule: Rule,
    pub index: u64,
}

/// Classify and parse one line.
///
/// `Ok(None)` means the line carries no rule (empty or comment).
pub fn build_rule(line: &str, filter_list_id: u32) -> Result<Option<Rule>, RuleSyntaxError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || is_comment(line) {
        return Ok(None);
    }

    if cosmetic::find_cosmetic_marker(trimmed).is_some() {
        return CosmeticRule::parse(trimmed, filter_list_id).map(|r| Some(Rule::Cosmetic(r)));
    }

    NetworkRule::parse(trimmed, filter_list_id).map(|r| Some(Rule::Network(r)))
}

/// Comment lines: first non-space byte is `!`, or the line starts with
/// `# ` (or is a lone `#`). A leading `#` followed by anything else may be a
/// cosmetic marker, so it is not a comment.
pub fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with('!') {
        return true;
    }
    let line = line.trim_end_matches(['\r', '\n']);
    line == "#" || line.starts_with("# ")
}
