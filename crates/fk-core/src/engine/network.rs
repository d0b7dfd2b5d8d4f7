//! Network engine index
//!
//! Every rule lands in exactly one of three places:
//!
//! 1. the shortcut table, keyed by the djb2 hash of one 5-byte window of the
//!    rule's shortcut (picked to keep buckets balanced),
//! 2. the domain table, keyed by the hash of each permitted domain,
//! 3. the fallback list, for rules with neither a usable shortcut nor
//!    permitted domains.
//!
//! Matching scans every 5-byte window of the URL (capped at 4096 bytes)
//! against the shortcut table, every suffix of the source hostname against
//! the domain table, and the fallback list last. Candidates are verified
//! with the full rule match; duplicates are possible and left to the
//! reducer.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domains::walk_host_suffixes;
use crate::hash::{fast_hash, fast_hash_bytes};
use crate::request::Request;
use crate::rules::network::NetworkRule;

/// Length of the indexed shortcut window.
pub const SHORTCUT_LENGTH: usize = 5;

/// Only this many leading bytes of a URL are scanned.
pub const MAX_URL_SCAN_LENGTH: usize = 4096;

/// A network rule paired with its storage index.
#[derive(Debug, Clone)]
pub struct IndexedNetworkRule {
    pub rule: Arc<NetworkRule>,
    pub index: u64,
}

/// The network rule index.
#[derive(Default)]
pub struct NetworkEngine {
    shortcuts_table: HashMap<u32, Vec<u64>>,
    shortcuts_histogram: HashMap<u32, u32>,
    domains_table: HashMap<u32, Vec<u64>>,
    other_rules: Vec<u64>,
    rules_by_index: HashMap<u64, Arc<NetworkRule>>,
    rules_count: usize,
}

impl NetworkEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rules accepted into the index.
    pub fn rules_count(&self) -> usize {
        self.rules_count
    }

    /// Index one rule under its storage index.
    pub fn add_rule(&mut self, rule: NetworkRule, storage_index: u64) {
        let hashes = rule_shortcut_hashes(&rule);
        if !hashes.is_empty() {
            let mut best = hashes[0];
            let mut best_count = self.histogram_count(best);
            for &hash in &hashes[1..] {
                let count = self.histogram_count(hash);
                if count < best_count {
                    best = hash;
                    best_count = count;
                }
            }
            *self.shortcuts_histogram.entry(best).or_insert(0) += 1;
            self.shortcuts_table.entry(best).or_default().push(storage_index);
        } else if !rule.permitted_domains.is_empty() {
            // Wildcard domains cannot key the hash table; those rules fall
            // back to the linear list
            let mut placed = false;
            for domain in &rule.permitted_domains {
                if domain.contains('*') {
                    continue;
                }
                self.domains_table
                    .entry(fast_hash(domain))
                    .or_default()
                    .push(storage_index);
                placed = true;
            }
            if !placed && !self.other_rules.contains(&storage_index) {
                self.other_rules.push(storage_index);
            }
        } else if !self.other_rules.contains(&storage_index) {
            self.other_rules.push(storage_index);
        }

        self.rules_by_index.insert(storage_index, Arc::new(rule));
        self.rules_count += 1;
    }

    fn histogram_count(&self, hash: u32) -> u32 {
        self.shortcuts_histogram.get(&hash).copied().unwrap_or(0)
    }

    /// Return every rule that matches the request, in index-probe order.
    pub fn match_all(&self, request: &Request) -> Vec<IndexedNetworkRule> {
        let mut matched = Vec::new();

        let url = request.url_lowercase.as_bytes();
        let scan_len = url.len().min(MAX_URL_SCAN_LENGTH);
        if scan_len >= SHORTCUT_LENGTH {
            for start in 0..=scan_len - SHORTCUT_LENGTH {
                let hash = fast_hash_bytes(&url[start..start + SHORTCUT_LENGTH]);
                if let Some(indexes) = self.shortcuts_table.get(&hash) {
                    self.collect_matches(indexes, request, &mut matched);
                }
            }
        }

        if let Some(source_hostname) = &request.source_hostname {
            for suffix in walk_host_suffixes(source_hostname) {
                if let Some(indexes) = self.domains_table.get(&fast_hash(suffix)) {
                    self.collect_matches(indexes, request, &mut matched);
                }
            }
        }

        self.collect_matches(&self.other_rules, request, &mut matched);

        matched
    }

    fn collect_matches(
        &self,
        indexes: &[u64],
        request: &Request,
        matched: &mut Vec<IndexedNetworkRule>,
    ) {
        for &index in indexes {
            // A missing entry means the rule is gone; tolerate the miss
            let rule = match self.rules_by_index.get(&index) {
                Some(rule) => rule,
                None => continue,
            };
            if rule.matches(request) {
                matched.push(IndexedNetworkRule {
                    rule: Arc::clone(rule),
                    index,
                });
            }
        }
    }
}

/// Hashes of every 5-byte window of the rule's shortcut, or empty when the
/// shortcut cannot key the index.
fn rule_shortcut_hashes(rule: &NetworkRule) -> Vec<u32> {
    let shortcut = rule.shortcut.as_str();
    if shortcut.len() < SHORTCUT_LENGTH || is_any_url_shortcut(shortcut) {
        return Vec::new();
    }

    shortcut
        .as_bytes()
        .windows(SHORTCUT_LENGTH)
        .map(fast_hash_bytes)
        .collect()
}

/// Shortcuts that match effectively every URL make useless index keys.
fn is_any_url_shortcut(shortcut: &str) -> bool {
    (shortcut.len() < 6 && shortcut.starts_with("ws:"))
        || (shortcut.len() < 7 && shortcut.starts_with("|ws"))
        || (shortcut.len() < 9 && shortcut.starts_with("http"))
        || (shortcut.len() < 10 && shortcut.starts_with("|http"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestType;

    fn engine_with(rules: &[&str]) -> NetworkEngine {
        let mut engine = NetworkEngine::new();
        for (i, text) in rules.iter().enumerate() {
            let rule = NetworkRule::parse(text, 1).unwrap();
            engine.add_rule(rule, i as u64);
        }
        engine
    }

    fn request(url: &str, source: Option<&str>) -> Request {
        Request::new(url, source, RequestType::Document)
    }

    #[test]
    fn test_match_via_shortcut() {
        let engine = engine_with(&["||example.org^"]);
        let matched = engine.match_all(&request("https://example.org/", None));
        assert!(!matched.is_empty());
        assert_eq!(matched[0].index, 0);
    }

    #[test]
    fn test_match_via_domain_table() {
        // The pattern is all-wildcard, so placement falls through to the
        // permitted domain
        let engine = engine_with(&["*$domain=example.org,image"]);
        let matched = engine.match_all(&Request::new(
            "https://cdn.net/pixel.png",
            Some("https://www.example.org/"),
            RequestType::Image,
        ));
        assert_eq!(matched.len(), 1);

        let unmatched = engine.match_all(&Request::new(
            "https://cdn.net/pixel.png",
            Some("https://other.net/"),
            RequestType::Image,
        ));
        assert!(unmatched.is_empty());
    }

    #[test]
    fn test_wildcard_domain_rule_falls_back() {
        let engine = engine_with(&["*$domain=*.example.org,image"]);
        let matched = engine.match_all(&Request::new(
            "https://cdn.net/pixel.png",
            Some("https://shop.example.org/"),
            RequestType::Image,
        ));
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn test_match_via_other_rules() {
        let engine = engine_with(&["ws:$websocket"]);
        let matched = engine.match_all(&Request::new(
            "ws://example.org/socket",
            None,
            RequestType::Websocket,
        ));
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn test_any_url_shortcuts_rejected() {
        assert!(is_any_url_shortcut("http"));
        assert!(is_any_url_shortcut("https://"));
        assert!(is_any_url_shortcut("ws:"));
        assert!(!is_any_url_shortcut("example.org"));
        assert!(!is_any_url_shortcut("httpmonitor"));
    }

    #[test]
    fn test_rules_count_per_insert() {
        let mut engine = NetworkEngine::new();
        let rule = NetworkRule::parse("||example.org^", 1).unwrap();
        engine.add_rule(rule.clone(), 10);
        engine.add_rule(rule, 11);
        assert_eq!(engine.rules_count(), 2);
    }

    #[test]
    fn test_match_all_deterministic() {
        let engine = engine_with(&["||example.org^", "||example.org^$important", "/banner"]);
        let req = request("https://example.org/banner", None);
        let first: Vec<u64> = engine.match_all(&req).iter().map(|r| r.index).collect();
        let second: Vec<u64> = engine.match_all(&req).iter().map(|r| r.index).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_url_scan_capped() {
        let engine = engine_with(&["trackpixel"]);

        // Marker entirely beyond the cap is never scanned
        let mut far = String::from("https://example.org/");
        far.push_str(&"a".repeat(MAX_URL_SCAN_LENGTH));
        far.push_str("trackpixel");
        assert!(far.len() > MAX_URL_SCAN_LENGTH);
        assert!(engine.match_all(&request(&far, None)).is_empty());

        // Same marker inside the window is found
        let mut near = String::from("https://example.org/trackpixel/");
        near.push_str(&"a".repeat(MAX_URL_SCAN_LENGTH));
        assert!(!engine.match_all(&request(&near, None)).is_empty());
    }
}
