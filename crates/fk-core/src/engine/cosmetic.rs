//! Cosmetic engine
//!
//! Cosmetic rules are bucketed at insert time: exception rules by content,
//! generic rules (no permitted domains), wildcard-domain rules, and a
//! hostname table for everything else. A lookup walks the hostname buckets,
//! adds wildcard and (optionally) generic candidates, then drops anything a
//! matching exception rule whitelists.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::domains::walk_host_suffixes;
use crate::rules::cosmetic::{CosmeticRule, CosmeticRuleKind};

bitflags::bitflags! {
    /// Which cosmetic rule kinds a lookup should produce.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CosmeticOptions: u8 {
        const ELEMENT_HIDING = 1 << 0;
        const CSS = 1 << 1;
        const JS = 1 << 2;
        const HTML = 1 << 3;
        /// Include generic (domain-less) rules.
        const GENERIC = 1 << 4;

        const ALL = Self::ELEMENT_HIDING.bits()
            | Self::CSS.bits()
            | Self::JS.bits()
            | Self::HTML.bits()
            | Self::GENERIC.bits();
    }
}

/// Cosmetic rules applicable to one hostname, by kind.
#[derive(Debug, Clone, Default)]
pub struct CosmeticResult {
    pub element_hiding: Vec<Arc<CosmeticRule>>,
    pub css: Vec<Arc<CosmeticRule>>,
    pub js: Vec<Arc<CosmeticRule>>,
    pub html: Vec<Arc<CosmeticRule>>,
}

impl CosmeticResult {
    pub fn is_empty(&self) -> bool {
        self.element_hiding.is_empty()
            && self.css.is_empty()
            && self.js.is_empty()
            && self.html.is_empty()
    }

    fn push(&mut self, rule: Arc<CosmeticRule>) {
        match rule.kind {
            CosmeticRuleKind::ElementHiding => self.element_hiding.push(rule),
            CosmeticRuleKind::CssInject => self.css.push(rule),
            CosmeticRuleKind::Js => self.js.push(rule),
            CosmeticRuleKind::Html => self.html.push(rule),
        }
    }
}

/// The cosmetic rule index.
#[derive(Default)]
pub struct CosmeticEngine {
    whitelist: HashMap<String, Vec<Arc<CosmeticRule>>>,
    generic_rules: Vec<Arc<CosmeticRule>>,
    wildcard_rules: Vec<Arc<CosmeticRule>>,
    by_hostname: HashMap<String, Vec<Arc<CosmeticRule>>>,
    rules_count: usize,
}

impl CosmeticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules_count(&self) -> usize {
        self.rules_count
    }

    /// Place one rule into its bucket.
    pub fn add_rule(&mut self, rule: CosmeticRule) {
        let rule = Arc::new(rule);
        self.rules_count += 1;

        if rule.whitelist {
            self.whitelist
                .entry(rule.content.clone())
                .or_default()
                .push(rule);
            return;
        }

        if rule.is_generic() {
            self.generic_rules.push(rule);
            return;
        }

        if rule.has_wildcard_domain() {
            self.wildcard_rules.push(rule);
            return;
        }

        for domain in &rule.permitted_domains {
            self.by_hostname
                .entry(domain.clone())
                .or_default()
                .push(Arc::clone(&rule));
        }
    }

    /// Collect the rules applicable to a hostname.
    pub fn match_hostname(&self, hostname: &str, options: CosmeticOptions) -> CosmeticResult {
        let mut result = CosmeticResult::default();
        if hostname.is_empty() {
            return result;
        }

        // A rule registered under several domains may surface through more
        // than one suffix bucket; count it once
        let mut seen: HashSet<usize> = HashSet::new();

        for suffix in walk_host_suffixes(hostname) {
            if let Some(rules) = self.by_hostname.get(suffix) {
                for rule in rules {
                    self.consider(rule, hostname, options, &mut seen, &mut result);
                }
            }
        }

        for rule in &self.wildcard_rules {
            self.consider(rule, hostname, options, &mut seen, &mut result);
        }

        if options.contains(CosmeticOptions::GENERIC) {
            for rule in &self.generic_rules {
                self.consider(rule, hostname, options, &mut seen, &mut result);
            }
        }

        result
    }

    fn consider(
        &self,
        rule: &Arc<CosmeticRule>,
        hostname: &str,
        options: CosmeticOptions,
        seen: &mut HashSet<usize>,
        result: &mut CosmeticResult,
    ) {
        if !kind_enabled(rule.kind, options) {
            return;
        }
        if !seen.insert(Arc::as_ptr(rule) as usize) {
            return;
        }
        if !rule.matches_hostname(hostname) {
            return;
        }
        if self.is_whitelisted(&rule.content, hostname) {
            return;
        }
        result.push(Arc::clone(rule));
    }

    fn is_whitelisted(&self, content: &str, hostname: &str) -> bool {
        match self.whitelist.get(content) {
            Some(rules) => rules.iter().any(|w| w.matches_hostname(hostname)),
            None => false,
        }
    }
}

fn kind_enabled(kind: CosmeticRuleKind, options: CosmeticOptions) -> bool {
    match kind {
        CosmeticRuleKind::ElementHiding => options.contains(CosmeticOptions::ELEMENT_HIDING),
        CosmeticRuleKind::CssInject => options.contains(CosmeticOptions::CSS),
        CosmeticRuleKind::Js => options.contains(CosmeticOptions::JS),
        CosmeticRuleKind::Html => options.contains(CosmeticOptions::HTML),
    }
}
