//! Matching-result reducer
//!
//! Reduces the set of matched network rules (plus the rules matched for the
//! source document) into one actionable verdict. Precedence for the basic
//! verdict is `important whitelist > important block > whitelist > block`;
//! within a class the rule with the highest storage index wins, which makes
//! the reduction deterministic regardless of input order.

use std::collections::BTreeMap;

use crate::engine::cosmetic::CosmeticOptions;
use crate::engine::network::IndexedNetworkRule;
use crate::rules::network::NetworkRuleFlags;

/// The reduced verdict for one request.
#[derive(Debug, Clone, Default)]
pub struct MatchingResult {
    /// The rule that decided the basic block/allow verdict.
    pub basic_rule: Option<IndexedNetworkRule>,
    /// Document-level exception covering the source page, if any.
    pub document_rule: Option<IndexedNetworkRule>,
    /// The page is allowlisted; nothing on it should be blocked.
    pub allowlisted: bool,
    pub csp_rules: Vec<IndexedNetworkRule>,
    pub replace_rules: Vec<IndexedNetworkRule>,
    pub cookie_rules: Vec<IndexedNetworkRule>,
    pub stealth_rules: Vec<IndexedNetworkRule>,
    pub redirect_rule: Option<IndexedNetworkRule>,
}

impl MatchingResult {
    /// Reduce matched rules into a verdict.
    ///
    /// `rules` are the matches for the request itself, `source_rules` the
    /// matches for a document request to the source URL. Duplicate matches
    /// (one rule hit through several index probes) are collapsed first.
    pub fn new(rules: Vec<IndexedNetworkRule>, source_rules: Vec<IndexedNetworkRule>) -> Self {
        let mut result = Self::default();

        let mut document_best: Option<IndexedNetworkRule> = None;
        for candidate in dedup_by_index(source_rules).into_values() {
            if candidate.rule.is_whitelist() && candidate.rule.is_document_level() {
                take_more_specific(&mut document_best, candidate);
            }
        }

        let mut important_whitelist: Option<IndexedNetworkRule> = None;
        let mut important_block: Option<IndexedNetworkRule> = None;
        let mut whitelist: Option<IndexedNetworkRule> = None;
        let mut block: Option<IndexedNetworkRule> = None;
        let mut redirect_candidates: Vec<IndexedNetworkRule> = Vec::new();
        let mut redirect_exceptions: Vec<IndexedNetworkRule> = Vec::new();
        let mut stealth_exception = false;

        for candidate in dedup_by_index(rules).into_values() {
            let rule = &candidate.rule;

            if rule.cookie.is_some() {
                result.cookie_rules.push(candidate);
                continue;
            }
            if rule.csp.is_some() {
                result.csp_rules.push(candidate);
                continue;
            }
            if rule.replace.is_some() {
                result.replace_rules.push(candidate);
                continue;
            }
            if rule.flags.contains(NetworkRuleFlags::STEALTH) {
                if rule.is_whitelist() {
                    stealth_exception = true;
                } else {
                    result.stealth_rules.push(candidate);
                }
                continue;
            }
            if rule.redirect.is_some() {
                if rule.is_whitelist() {
                    redirect_exceptions.push(candidate);
                } else {
                    redirect_candidates.push(candidate);
                }
                continue;
            }
            if rule.is_whitelist() && rule.is_document_level() {
                // A document-level exception matched the request directly
                take_more_specific(&mut document_best, candidate);
                continue;
            }

            // Iteration is in ascending index order, so >= keeps the rule
            // with the highest storage index in each class
            let slot = match (rule.is_whitelist(), rule.is_important()) {
                (true, true) => &mut important_whitelist,
                (false, true) => &mut important_block,
                (true, false) => &mut whitelist,
                (false, false) => &mut block,
            };
            *slot = Some(candidate);
        }

        let document_allows = document_best.as_ref().map_or(false, |d| {
            d.rule
                .flags
                .intersects(NetworkRuleFlags::DOCUMENT | NetworkRuleFlags::URLBLOCK)
        });
        let document_important =
            document_best.as_ref().map_or(false, |d| d.rule.is_important());
        result.document_rule = document_best;

        if let Some(rule) = important_whitelist {
            result.allowlisted = true;
            result.basic_rule = Some(rule);
        } else if document_allows && document_important {
            result.allowlisted = true;
        } else if let Some(rule) = important_block {
            result.basic_rule = Some(rule);
        } else if document_allows {
            result.allowlisted = true;
        } else if let Some(rule) = whitelist {
            result.basic_rule = Some(rule);
        } else if let Some(rule) = block {
            result.basic_rule = Some(rule);
        }

        result.csp_rules = cancel_by_exceptions(result.csp_rules, csp_value);
        result.replace_rules = cancel_by_exceptions(result.replace_rules, replace_value);
        if stealth_exception {
            result.stealth_rules.clear();
        }
        result.redirect_rule = pick_redirect(redirect_candidates, &redirect_exceptions);

        result
    }

    /// The rule that decided the verdict.
    pub fn get_basic_result(&self) -> Option<&IndexedNetworkRule> {
        self.basic_rule.as_ref()
    }

    pub fn is_allowlisted(&self) -> bool {
        self.allowlisted
    }

    /// Whether the request should be blocked.
    pub fn should_block(&self) -> bool {
        if self.allowlisted {
            return false;
        }
        match &self.basic_rule {
            Some(basic) => !basic.rule.is_whitelist(),
            None => false,
        }
    }

    /// Cosmetic option bits implied by the document-level exceptions.
    pub fn cosmetic_options(&self) -> CosmeticOptions {
        let mut options = CosmeticOptions::ALL;
        if let Some(document) = &self.document_rule {
            let flags = document.rule.flags;
            if flags.intersects(NetworkRuleFlags::DOCUMENT | NetworkRuleFlags::ELEMHIDE) {
                options -= CosmeticOptions::ELEMENT_HIDING | CosmeticOptions::CSS;
            }
            if flags.intersects(NetworkRuleFlags::DOCUMENT | NetworkRuleFlags::GENERICHIDE) {
                options -= CosmeticOptions::GENERIC;
            }
        }
        options
    }
}

fn dedup_by_index(rules: Vec<IndexedNetworkRule>) -> BTreeMap<u64, IndexedNetworkRule> {
    let mut by_index = BTreeMap::new();
    for rule in rules {
        by_index.entry(rule.index).or_insert(rule);
    }
    by_index
}

/// Specificity order for document-level exceptions: longer pattern first,
/// storage index as the tie-break.
fn take_more_specific(slot: &mut Option<IndexedNetworkRule>, candidate: IndexedNetworkRule) {
    let better = match slot {
        Some(current) => {
            let current_key = (current.rule.pattern.len(), current.index);
            let candidate_key = (candidate.rule.pattern.len(), candidate.index);
            candidate_key >= current_key
        }
        None => true,
    };
    if better {
        *slot = Some(candidate);
    }
}

fn csp_value(rule: &IndexedNetworkRule) -> Option<&str> {
    rule.rule.csp.as_deref()
}

fn replace_value(rule: &IndexedNetworkRule) -> Option<&str> {
    rule.rule.replace.as_deref()
}

/// Drop modifier rules cancelled by a whitelist rule carrying the same
/// modifier: an empty exception value cancels everything, otherwise only the
/// equal value.
fn cancel_by_exceptions(
    rules: Vec<IndexedNetworkRule>,
    value: fn(&IndexedNetworkRule) -> Option<&str>,
) -> Vec<IndexedNetworkRule> {
    let mut cancel_all = false;
    let mut cancelled: Vec<String> = Vec::new();
    for rule in rules.iter().filter(|r| r.rule.is_whitelist()) {
        match value(rule) {
            Some("") | None => cancel_all = true,
            Some(v) => cancelled.push(v.to_string()),
        }
    }

    if cancel_all {
        return Vec::new();
    }

    rules
        .into_iter()
        .filter(|rule| {
            if rule.rule.is_whitelist() {
                return false;
            }
            let v = value(rule).unwrap_or("");
            !cancelled.iter().any(|c| c == v)
        })
        .collect()
}


fn pick_redirect(
    candidates: Vec<IndexedNetworkRule>,
    exceptions: &[IndexedNetworkRule],
) -> Option<IndexedNetworkRule> {
    let cancel_all = exceptions
        .iter()
        .any(|e| e.rule.redirect.as_deref() == Some(""));

    let mut best: Option<IndexedNetworkRule> = None;
    for candidate in candidates {
        if cancel_all {
            return None;
        }
        let resource = candidate.rule.redirect.as_deref().unwrap_or("");
        if exceptions
            .iter()
            .any(|e| e.rule.redirect.as_deref() == Some(resource))
        {
            continue;
        }
        let better = match &best {
            Some(current) => {
                let current_key = (current.rule.is_important(), current.index);
                let candidate_key = (candidate.rule.is_important(), candidate.index);
                candidate_key > current_key
            }
            None => true,
        };
        if better {
            best = Some(candidate);
        }
    }
    best
}
