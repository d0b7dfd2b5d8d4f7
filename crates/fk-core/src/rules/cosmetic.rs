//! Cosmetic rules
//!
//! A cosmetic rule is `domains<marker>content`, where the marker selects the
//! kind (element hiding, CSS injection, JS, HTML filtering) and whether the
//! rule is an exception. The domain list is comma-separated with `~`
//! restrictions and may contain wildcard patterns.

use crate::domains::domain_matches;
use crate::error::RuleSyntaxError;

// =============================================================================
// Markers
// =============================================================================

/// Cosmetic rule markers, longest first so that prefixes never shadow the
/// longer forms.
const MARKERS: [(&str, CosmeticRuleKind, bool, bool); 10] = [
    ("#@?#", CosmeticRuleKind::ElementHiding, true, true),
    ("#@$#", CosmeticRuleKind::CssInject, true, false),
    ("#@%#", CosmeticRuleKind::Js, true, false),
    ("#?#", CosmeticRuleKind::ElementHiding, false, true),
    ("#$#", CosmeticRuleKind::CssInject, false, false),
    ("#%#", CosmeticRuleKind::Js, false, false),
    ("#@#", CosmeticRuleKind::ElementHiding, true, false),
    ("##", CosmeticRuleKind::ElementHiding, false, false),
    ("$@$", CosmeticRuleKind::Html, true, false),
    ("$$", CosmeticRuleKind::Html, false, false),
];

/// Kind of page modification a cosmetic rule performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CosmeticRuleKind {
    /// `##` - hide elements matching a selector
    ElementHiding,
    /// `#$#` - inject a CSS snippet
    CssInject,
    /// `#%#` - run a JS snippet
    Js,
    /// `$$` - filter HTML content
    Html,
}

/// Locate the first cosmetic marker in a line.
///
/// Returns the marker byte offset, the marker string, the rule kind, the
/// whitelist flag and the extended-css flag.
pub fn find_cosmetic_marker(line: &str) -> Option<(usize, &'static str, CosmeticRuleKind, bool, bool)> {
    let mut best: Option<(usize, &'static str, CosmeticRuleKind, bool, bool)> = None;
    for (marker, kind, whitelist, extended) in MARKERS {
        if let Some(pos) = line.find(marker) {
            let better = match best {
                Some((best_pos, best_marker, ..)) => {
                    pos < best_pos || (pos == best_pos && marker.len() > best_marker.len())
                }
                None => true,
            };
            if better {
                best = Some((pos, marker, kind, whitelist, extended));
            }
        }
    }
    best
}

// =============================================================================
// Cosmetic Rule
// =============================================================================

/// A parsed cosmetic rule.
#[derive(Debug, Clone)]
pub struct CosmeticRule {
    /// Original rule text.
    pub text: String,
    /// Selector / snippet body after the marker.
    pub content: String,
    pub kind: CosmeticRuleKind,
    /// Rule uses extended CSS selectors (`#?#`).
    pub extended_css: bool,
    /// Exception rule (`#@#` family).
    pub whitelist: bool,
    pub permitted_domains: Vec<String>,
    pub restricted_domains: Vec<String>,
    pub filter_list_id: u32,
}

impl CosmeticRule {
    /// Parse one filter-list line as a cosmetic rule.
    pub fn parse(line: &str, filter_list_id: u32) -> Result<Self, RuleSyntaxError> {
        let text = line.trim();
        let (marker_pos, marker, kind, whitelist, extended_css) = find_cosmetic_marker(text)
            .ok_or_else(|| RuleSyntaxError::new(line, "not a cosmetic rule"))?;

        let content = text[marker_pos + marker.len()..].trim();
        if content.is_empty() {
            return Err(RuleSyntaxError::new(line, "empty cosmetic rule content"));
        }

        let mut permitted_domains = Vec::new();
        let mut restricted_domains = Vec::new();
        for raw in text[..marker_pos].split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            match raw.strip_prefix('~') {
                Some(domain) if !domain.is_empty() => {
                    restricted_domains.push(domain.to_ascii_lowercase());
                }
                Some(_) => return Err(RuleSyntaxError::new(line, "empty restricted domain")),
                None => permitted_domains.push(raw.to_ascii_lowercase()),
            }
        }

        Ok(Self {
            text: text.to_string(),
            content: content.to_string(),
            kind,
            extended_css,
            whitelist,
            permitted_domains,
            restricted_domains,
            filter_list_id,
        })
    }

    /// Whether the rule applies to every hostname (no permitted domains).
    pub fn is_generic(&self) -> bool {
        self.permitted_domains.is_empty()
    }

    /// Whether any permitted domain is a wildcard pattern.
    pub fn has_wildcard_domain(&self) -> bool {
        self.permitted_domains.iter().any(|d| d.contains('*'))
    }

    /// Match the rule's domain constraints against a hostname.
    pub fn matches_hostname(&self, hostname: &str) -> bool {
        if self
            .restricted_domains
            .iter()
            .any(|d| domain_matches(d, hostname))
        {
            return false;
        }
        if self.permitted_domains.is_empty() {
            return true;
        }
        self.permitted_domains
            .iter()
            .any(|d| domain_matches(d, hostname))
    }
}
