//! Network rules
//!
//! A network rule is an Adblock-Plus style pattern plus `$`-delimited
//! modifiers. Parsing normalizes the pattern (anchors become flags, the case
//! is folded unless `$match-case` is present) and extracts the shortcut the
//! engine indexes on. Matching is a cheap cascade: request type, source
//! domains, party, then the pattern itself.

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::domains::domain_matches;
use crate::error::RuleSyntaxError;
use crate::request::{Request, RequestType, RequestTypeMask};
use crate::rules::cookie::{parse_max_age, CookieModifier};

// =============================================================================
// Rule Flags
// =============================================================================

bitflags::bitflags! {
    /// Flags for network rule behavior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NetworkRuleFlags: u32 {
        /// Exception rule (@@ prefix) - allows the request
        const WHITELIST = 1 << 0;
        /// $important - wins over plain exceptions
        const IMPORTANT = 1 << 1;
        /// $third-party - only third-party requests
        const THIRD_PARTY = 1 << 2;
        /// $~third-party / $first-party - only first-party requests
        const FIRST_PARTY = 1 << 3;
        /// $match-case - case-sensitive pattern matching
        const MATCH_CASE = 1 << 4;
        /// $document - document-level rule
        const DOCUMENT = 1 << 5;
        /// $urlblock - disables URL blocking on matching pages
        const URLBLOCK = 1 << 6;
        /// $elemhide - disables element hiding on matching pages
        const ELEMHIDE = 1 << 7;
        /// $generichide - disables generic element hiding on matching pages
        const GENERICHIDE = 1 << 8;
        /// $popup
        const POPUP = 1 << 9;
        /// $stealth
        const STEALTH = 1 << 10;
        /// Pattern starts with |
        const LEFT_ANCHOR = 1 << 11;
        /// Pattern ends with |
        const RIGHT_ANCHOR = 1 << 12;
        /// Pattern starts with || (hostname anchor)
        const HOST_ANCHOR = 1 << 13;

        /// Options that allowlist a whole page rather than one request.
        const DOCUMENT_LEVEL = Self::DOCUMENT.bits()
            | Self::URLBLOCK.bits()
            | Self::ELEMHIDE.bits()
            | Self::GENERICHIDE.bits();
    }
}

// =============================================================================
// Network Rule
// =============================================================================

/// A parsed network rule.
#[derive(Debug, Clone)]
pub struct NetworkRule {
    /// Original rule text.
    pub text: String,
    /// Pattern with anchors stripped; lowercased unless `$match-case`.
    pub pattern: String,
    /// Longest literal substring of the pattern, lowercased.
    pub shortcut: String,
    pub permitted_domains: Vec<String>,
    pub restricted_domains: Vec<String>,
    pub permitted_types: RequestTypeMask,
    pub restricted_types: RequestTypeMask,
    pub flags: NetworkRuleFlags,
    pub csp: Option<String>,
    pub replace: Option<String>,
    pub redirect: Option<String>,
    pub cookie: Option<CookieModifier>,
    pub filter_list_id: u32,
    regex: OnceCell<Option<Regex>>,
}

impl NetworkRule {
    /// Parse one filter-list line as a network rule.
    pub fn parse(line: &str, filter_list_id: u32) -> Result<Self, RuleSyntaxError> {
        let text = line.trim();
        if text.is_empty() {
            return Err(RuleSyntaxError::new(line, "empty rule"));
        }

        let mut flags = NetworkRuleFlags::empty();
        let mut rest = text;
        if let Some(stripped) = rest.strip_prefix("@@") {
            flags |= NetworkRuleFlags::WHITELIST;
            rest = stripped;
        }

        let (pattern_part, options_part) = match rest.find('$') {
            Some(pos) => (&rest[..pos], Some(&rest[pos + 1..])),
            None => (rest, None),
        };

        let mut options = ParsedOptions::default();
        if let Some(options_text) = options_part {
            parse_options(text, options_text, &mut options)?;
        }
        flags |= options.flags;

        let mut pattern = pattern_part.trim();
        if let Some(p) = pattern.strip_prefix("||") {
            flags |= NetworkRuleFlags::HOST_ANCHOR;
            pattern = p;
        } else if let Some(p) = pattern.strip_prefix('|') {
            flags |= NetworkRuleFlags::LEFT_ANCHOR;
            pattern = p;
        }
        if let Some(p) = pattern.strip_suffix('|') {
            flags |= NetworkRuleFlags::RIGHT_ANCHOR;
            pattern = p;
        }

        if pattern.is_empty() && options_part.is_none() {
            return Err(RuleSyntaxError::new(line, "rule is too short"));
        }

        let pattern = if flags.contains(NetworkRuleFlags::MATCH_CASE) {
            pattern.to_string()
        } else {
            pattern.to_ascii_lowercase()
        };
        let shortcut = extract_shortcut(&pattern);

        Ok(Self {
            text: text.to_string(),
            pattern,
            shortcut,
            permitted_domains: options.permitted_domains,
            restricted_domains: options.restricted_domains,
            permitted_types: options.permitted_types,
            restricted_types: options.restricted_types,
            flags,
            csp: options.csp,
            replace: options.replace,
            redirect: options.redirect,
            cookie: options.cookie,
            filter_list_id,
            regex: OnceCell::new(),
        })
    }

    pub fn is_whitelist(&self) -> bool {
        self.flags.contains(NetworkRuleFlags::WHITELIST)
    }

    pub fn is_important(&self) -> bool {
        self.flags.contains(NetworkRuleFlags::IMPORTANT)
    }

    /// Whether this rule allowlists a whole page (document-level options).
    pub fn is_document_level(&self) -> bool {
        self.flags.intersects(NetworkRuleFlags::DOCUMENT_LEVEL)
    }

    /// Match this rule against a request.
    pub fn matches(&self, request: &Request) -> bool {
        self.match_request_type(request.request_type)
            && self.match_source_domains(request)
            && self.match_party(request)
            && self.match_pattern(request)
    }

    fn match_request_type(&self, request_type: RequestType) -> bool {
        let bit = request_type.mask();
        if !self.permitted_types.is_empty() && !self.permitted_types.contains(bit) {
            return false;
        }
        !self.restricted_types.contains(bit)
    }

    fn match_source_domains(&self, request: &Request) -> bool {
        if self.permitted_domains.is_empty() && self.restricted_domains.is_empty() {
            return true;
        }

        let host = match &request.source_hostname {
            Some(host) => host.as_str(),
            None => return self.permitted_domains.is_empty(),
        };

        if self.restricted_domains.iter().any(|d| domain_matches(d, host)) {
            return false;
        }
        if self.permitted_domains.is_empty() {
            return true;
        }
        self.permitted_domains.iter().any(|d| domain_matches(d, host))
    }

    fn match_party(&self, request: &Request) -> bool {
        if self.flags.contains(NetworkRuleFlags::THIRD_PARTY) && !request.is_third_party {
            return false;
        }
        if self.flags.contains(NetworkRuleFlags::FIRST_PARTY) && request.is_third_party {
            return false;
        }
        true
    }

    fn match_pattern(&self, request: &Request) -> bool {
        let haystack = if self.flags.contains(NetworkRuleFlags::MATCH_CASE) {
            &request.url
        } else {
            &request.url_lowercase
        };

        if self.is_plain_pattern() {
            if self.pattern.is_empty() {
                return true;
            }
            return haystack.contains(&self.pattern);
        }

        match self.regex() {
            Some(regex) => regex.is_match(haystack),
            None => false,
        }
    }

    fn is_plain_pattern(&self) -> bool {
        !self.flags.intersects(
            NetworkRuleFlags::HOST_ANCHOR
                | NetworkRuleFlags::LEFT_ANCHOR
                | NetworkRuleFlags::RIGHT_ANCHOR,
        ) && !self.pattern.contains(['*', '^'])
    }

    fn regex(&self) -> Option<&Regex> {
        self.regex
            .get_or_init(|| compile_pattern_regex(&self.pattern, self.flags, &self.text))
            .as_ref()
    }
}

// =============================================================================
// Pattern Translation
// =============================================================================

/// `^` separator: any char that cannot appear in a hostname or path token,
/// or the end of the URL.
const SEPARATOR_CLASS: &str = "([^a-zA-Z0-9_.%-]|$)";

/// `||` anchor: any scheme, then an optional subdomain prefix.
const HOST_ANCHOR_PREFIX: &str = r"^[a-z][a-z0-9+.-]*://([a-z0-9-_.]+\.)?";

fn compile_pattern_regex(pattern: &str, flags: NetworkRuleFlags, text: &str) -> Option<Regex> {
    let mut re = String::with_capacity(pattern.len() * 2 + 24);

    if flags.contains(NetworkRuleFlags::HOST_ANCHOR) {
        re.push_str(HOST_ANCHOR_PREFIX);
    } else if flags.contains(NetworkRuleFlags::LEFT_ANCHOR) {
        re.push('^');
    }

    let mut literal = String::new();
    for ch in pattern.chars() {
        match ch {
            '*' => {
                flush_literal(&mut re, &mut literal);
                re.push_str(".*");
            }
            '^' => {
                flush_literal(&mut re, &mut literal);
                re.push_str(SEPARATOR_CLASS);
            }
            other => literal.push(other),
        }
    }
    flush_literal(&mut re, &mut literal);

    if flags.contains(NetworkRuleFlags::RIGHT_ANCHOR) {
        re.push('$');
    }

    match Regex::new(&re) {
        Ok(regex) => Some(regex),
        Err(err) => {
            log::debug!("cannot compile pattern of rule \"{text}\": {err}");
            None
        }
    }
}

fn flush_literal(re: &mut String, literal: &mut String) {
    if !literal.is_empty() {
        re.push_str(&regex::escape(literal));
        literal.clear();
    }
}

/// Extract the longest contiguous literal substring of a pattern.
fn extract_shortcut(pattern: &str) -> String {
    let bytes = pattern.as_bytes();
    let mut best_start = 0;
    let mut best_len = 0;
    let mut run_start = 0;
    let mut in_run = false;

    for (i, &b) in bytes.iter().enumerate() {
        let special = b == b'*' || b == b'^' || b == b'|';
        if special {
            in_run = false;
            continue;
        }
        if !in_run {
            run_start = i;
            in_run = true;
        }
        let len = i - run_start + 1;
        if len > best_len {
            best_len = len;
            best_start = run_start;
        }
    }

    pattern[best_start..best_start + best_len].to_ascii_lowercase()
}

// =============================================================================
// Option Parsing
// =============================================================================

struct ParsedOptions {
    flags: NetworkRuleFlags,
    permitted_domains: Vec<String>,
    restricted_domains: Vec<String>,
    permitted_types: RequestTypeMask,
    restricted_types: RequestTypeMask,
    csp: Option<String>,
    replace: Option<String>,
    redirect: Option<String>,
    cookie: Option<CookieModifier>,
}

impl Default for ParsedOptions {
    fn default() -> Self {
        Self {
            flags: NetworkRuleFlags::empty(),
            permitted_domains: Vec::new(),
            restricted_domains: Vec::new(),
            permitted_types: RequestTypeMask::empty(),
            restricted_types: RequestTypeMask::empty(),
            csp: None,
            replace: None,
            redirect: None,
            cookie: None,
        }
    }
}

fn parse_options(
    rule_text: &str,
    options_text: &str,
    out: &mut ParsedOptions,
) -> Result<(), RuleSyntaxError> {
    let mut pending_max_age: Option<u64> = None;
    let mut pending_same_site: Option<String> = None;

    for raw in options_text.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let (negated, option) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let (name, value) = match option.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (option, None),
        };
        let name_lower = name.to_ascii_lowercase();

        if let Some(mask) = request_type_option(&name_lower) {
            if negated {
                out.restricted_types |= mask;
            } else {
                out.permitted_types |= mask;
            }
            if !negated && (name_lower == "document" || name_lower == "doc") {
                out.flags |= NetworkRuleFlags::DOCUMENT;
            }
            continue;
        }

        if negated && !matches!(name_lower.as_str(), "third-party" | "first-party" | "match-case")
        {
            return Err(RuleSyntaxError::new(
                rule_text,
                format!("modifier \"{name}\" cannot be negated"),
            ));
        }

        match name_lower.as_str() {
            "important" => out.flags |= NetworkRuleFlags::IMPORTANT,
            "match-case" | "match_case" => {
                if !negated {
                    out.flags |= NetworkRuleFlags::MATCH_CASE;
                }
            }
            "third-party" | "3p" => {
                out.flags |= if negated {
                    NetworkRuleFlags::FIRST_PARTY
                } else {
                    NetworkRuleFlags::THIRD_PARTY
                };
            }
            "first-party" | "1p" => {
                out.flags |= if negated {
                    NetworkRuleFlags::THIRD_PARTY
                } else {
                    NetworkRuleFlags::FIRST_PARTY
                };
            }
            "popup" => out.flags |= NetworkRuleFlags::POPUP,
            "elemhide" => out.flags |= NetworkRuleFlags::ELEMHIDE,
            "generichide" => out.flags |= NetworkRuleFlags::GENERICHIDE,
            "urlblock" => out.flags |= NetworkRuleFlags::URLBLOCK,
            "stealth" => out.flags |= NetworkRuleFlags::STEALTH,
            "domain" => {
                let value = value
                    .ok_or_else(|| RuleSyntaxError::new(rule_text, "$domain requires a value"))?;
                parse_domain_option(rule_text, value, out)?;
            }
            "csp" => out.csp = Some(value.unwrap_or("").to_string()),
            "replace" => out.replace = Some(value.unwrap_or("").to_string()),
            "redirect" | "redirect-rule" => {
                let value = value
                    .ok_or_else(|| RuleSyntaxError::new(rule_text, "$redirect requires a value"))?;
                out.redirect = Some(value.to_string());
            }
            "cookie" => {
                let modifier = CookieModifier::parse(value.unwrap_or(""))
                    .map_err(|reason| RuleSyntaxError::new(rule_text, reason))?;
                out.cookie = Some(modifier);
            }
            "maxage" => {
                let value = value
                    .ok_or_else(|| RuleSyntaxError::new(rule_text, "maxAge requires a value"))?;
                pending_max_age =
                    Some(parse_max_age(value).map_err(|r| RuleSyntaxError::new(rule_text, r))?);
            }
            "samesite" => {
                let value = value
                    .ok_or_else(|| RuleSyntaxError::new(rule_text, "sameSite requires a value"))?;
                pending_same_site = Some(value.to_string());
            }
            _ => {
                return Err(RuleSyntaxError::new(
                    rule_text,
                    format!("unknown modifier \"{name}\""),
                ));
            }
        }
    }

    if pending_max_age.is_some() || pending_same_site.is_some() {
        let cookie = out.cookie.as_mut().ok_or_else(|| {
            RuleSyntaxError::new(rule_text, "maxAge/sameSite require the cookie modifier")
        })?;
        if let Some(seconds) = pending_max_age {
            cookie.set_max_age(seconds);
        }
        if let Some(same_site) = &pending_same_site {
            cookie.set_same_site(same_site);
        }
    }

    Ok(())
}

fn request_type_option(name: &str) -> Option<RequestTypeMask> {
    match name {
        "document" | "doc" => Some(RequestTypeMask::DOCUMENT),
        "subdocument" => Some(RequestTypeMask::SUBDOCUMENT),
        "stylesheet" => Some(RequestTypeMask::STYLESHEET),
        "script" => Some(RequestTypeMask::SCRIPT),
        "image" => Some(RequestTypeMask::IMAGE),
        "font" => Some(RequestTypeMask::FONT),
        "media" => Some(RequestTypeMask::MEDIA),
        "xmlhttprequest" | "xhr" => Some(RequestTypeMask::XMLHTTPREQUEST),
        "websocket" => Some(RequestTypeMask::WEBSOCKET),
        "object" | "other" | "ping" => Some(RequestTypeMask::OTHER),
        _ => None,
    }
}

fn parse_domain_option(
    rule_text: &str,
    value: &str,
    out: &mut ParsedOptions,
) -> Result<(), RuleSyntaxError> {
    for raw in value.split('|') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let (restricted, domain) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        if domain.is_empty() {
            return Err(RuleSyntaxError::new(rule_text, "empty domain in $domain"));
        }
        let domain = domain.to_ascii_lowercase();
        if restricted {
            out.restricted_domains.push(domain);
        } else {
            out.permitted_domains.push(domain);
        }
    }

    if out.permitted_domains.is_empty() && out.restricted_domains.is_empty() {
        return Err(RuleSyntaxError::new(rule_text, "$domain has no domains"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str, source: Option<&str>, request_type: RequestType) -> Request {
        Request::new(url, source, request_type)
    }

    #[test]
    fn test_parse_basic() {
        let rule = NetworkRule::parse("||example.org^", 1).unwrap();
        assert!(rule.flags.contains(NetworkRuleFlags::HOST_ANCHOR));
        assert_eq!(rule.shortcut, "example.org");
        assert_eq!(rule.filter_list_id, 1);
        assert!(!rule.is_whitelist());
    }

    #[test]
    fn test_parse_whitelist() {
        let rule = NetworkRule::parse("@@||example.org^$document", 0).unwrap();
        assert!(rule.is_whitelist());
        assert!(rule.flags.contains(NetworkRuleFlags::DOCUMENT));
        assert!(rule.is_document_level());
    }

    #[test]
    fn test_parse_unknown_modifier() {
        assert!(NetworkRule::parse("||example.org^$bogus", 0).is_err());
    }

    #[test]
    fn test_parse_domain_option() {
        let rule = NetworkRule::parse("/banner$domain=example.org|~sub.example.org", 0).unwrap();
        assert_eq!(rule.permitted_domains, vec!["example.org"]);
        assert_eq!(rule.restricted_domains, vec!["sub.example.org"]);
    }

    #[test]
    fn test_parse_cookie_with_standalone_fields() {
        let rule = NetworkRule::parse("||site.com^$cookie=tracker,maxAge=60", 0).unwrap();
        let cookie = rule.cookie.as_ref().unwrap();
        assert_eq!(cookie.max_age(), Some(60));
        assert!(cookie.is_modifying());
    }

    #[test]
    fn test_shortcut_extraction() {
        assert_eq!(extract_shortcut("example.org/banner"), "example.org/banner");
        assert_eq!(extract_shortcut("ads*tracker.example"), "tracker.example");
        assert_eq!(extract_shortcut("a^longerpiece^b"), "longerpiece");
        assert_eq!(extract_shortcut("***"), "");
    }

    #[test]
    fn test_match_host_anchor() {
        let rule = NetworkRule::parse("||example.org^", 0).unwrap();
        assert!(rule.matches(&request("https://example.org/", None, RequestType::Document)));
        assert!(rule.matches(&request("https://sub.example.org/x", None, RequestType::Script)));
        assert!(!rule.matches(&request("https://notexample.org/", None, RequestType::Document)));
        assert!(!rule.matches(&request("https://example.org.evil.com/", None, RequestType::Document)));
    }

    #[test]
    fn test_match_separator() {
        let rule = NetworkRule::parse("||example.org^", 0).unwrap();
        // ^ must match end-of-url and '/' but not a hostname character
        assert!(rule.matches(&request("https://example.org", None, RequestType::Document)));
        assert!(!rule.matches(&request("https://example.organic.com/", None, RequestType::Document)));
    }

    #[test]
    fn test_match_wildcard() {
        let rule = NetworkRule::parse("/banner/*/img^", 0).unwrap();
        assert!(rule.matches(&request(
            "https://example.org/banner/foo/img?x=1",
            None,
            RequestType::Image
        )));
        assert!(!rule.matches(&request("https://example.org/banner/img", None, RequestType::Image)));
    }

    #[test]
    fn test_match_anchors() {
        let rule = NetworkRule::parse("|https://example.org/exact|", 0).unwrap();
        assert!(rule.matches(&request("https://example.org/exact", None, RequestType::Other)));
        assert!(!rule.matches(&request("https://example.org/exact/no", None, RequestType::Other)));
        assert!(!rule.matches(&request("https://evil.com/https://example.org/exact", None, RequestType::Other)));
    }

    #[test]
    fn test_match_case() {
        let plain = NetworkRule::parse("/BannerAd", 0).unwrap();
        assert!(plain.matches(&request("https://example.org/bannerad", None, RequestType::Image)));

        let cased = NetworkRule::parse("/BannerAd$match-case", 0).unwrap();
        assert!(cased.matches(&request("https://example.org/BannerAd", None, RequestType::Image)));
        assert!(!cased.matches(&request("https://example.org/bannerad", None, RequestType::Image)));
    }

    #[test]
    fn test_match_third_party() {
        let rule = NetworkRule::parse("||tracker.com^$third-party", 0).unwrap();
        assert!(rule.matches(&request(
            "https://tracker.com/a.js",
            Some("https://example.org/"),
            RequestType::Script
        )));
        assert!(!rule.matches(&request(
            "https://tracker.com/a.js",
            Some("https://www.tracker.com/"),
            RequestType::Script
        )));
    }

    #[test]
    fn test_match_request_type() {
        let rule = NetworkRule::parse("||example.org^$script,~image", 0).unwrap();
        assert!(rule.matches(&request("https://example.org/a.js", None, RequestType::Script)));
        assert!(!rule.matches(&request("https://example.org/a.png", None, RequestType::Image)));
        assert!(!rule.matches(&request("https://example.org/", None, RequestType::Document)));
    }

    #[test]
    fn test_match_source_domains() {
        let rule = NetworkRule::parse("/widget$domain=example.org", 0).unwrap();
        assert!(rule.matches(&request(
            "https://cdn.com/widget.js",
            Some("https://www.example.org/"),
            RequestType::Script
        )));
        assert!(!rule.matches(&request(
            "https://cdn.com/widget.js",
            Some("https://other.org/"),
            RequestType::Script
        )));
        assert!(!rule.matches(&request("https://cdn.com/widget.js", None, RequestType::Script)));
    }

    #[test]
    fn test_empty_pattern_with_options_matches_all() {
        let rule = NetworkRule::parse("$cookie=tracker,domain=example.org", 0).unwrap();
        assert!(rule.matches(&request(
            "https://anything.com/x",
            Some("https://example.org/"),
            RequestType::Document
        )));
    }
}
