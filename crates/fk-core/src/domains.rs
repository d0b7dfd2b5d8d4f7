//! Hostname and domain utilities
//!
//! Registrable-domain extraction uses a small table of common two-part
//! suffixes rather than a full Public Suffix List; third-party detection and
//! `$domain=` matching only need the registrable domain to be consistent
//! between the request and its source.

use std::collections::HashSet;

use once_cell::sync::Lazy;

// =============================================================================
// Registrable Domain
// =============================================================================

static TWO_PART_SUFFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "co.uk", "org.uk", "me.uk", "ac.uk", "gov.uk", "co.jp", "ne.jp", "or.jp", "com.au",
        "net.au", "org.au", "com.br", "net.br", "org.br", "co.nz", "net.nz", "org.nz", "co.in",
        "net.in", "org.in", "co.za", "com.cn", "net.cn", "org.cn", "com.mx", "com.ar", "com.tr",
        "com.tw", "co.kr", "or.kr", "com.sg", "com.hk", "co.il", "org.il", "com.ua", "com.pl",
    ]
    .into_iter()
    .collect()
});

/// Extract the registrable domain (eTLD+1) of a hostname.
///
/// "sub.example.com" -> "example.com", "a.b.example.co.uk" -> "example.co.uk".
/// A bare registrable domain is returned unchanged.
pub fn registrable_domain(host: &str) -> &str {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host;
    }

    let two_part = &host[host.len() - labels[labels.len() - 2].len() - labels[labels.len() - 1].len() - 1..];
    let take = if TWO_PART_SUFFIXES.contains(two_part) { 3 } else { 2 };
    if labels.len() <= take {
        return host;
    }

    let skip = labels.len() - take;
    let mut offset = 0;
    for label in labels.iter().take(skip) {
        offset += label.len() + 1;
    }
    &host[offset..]
}

/// Check whether a request to `host` is third-party relative to `source_host`.
pub fn is_third_party(host: &str, source_host: &str) -> bool {
    registrable_domain(host) != registrable_domain(source_host)
}

// =============================================================================
// Suffix Walking
// =============================================================================

/// Iterator over a hostname and all of its parent suffixes, most specific
/// first: "a.b.example.com" yields "a.b.example.com", "b.example.com",
/// "example.com", "com".
pub struct HostSuffixIter<'a> {
    remaining: Option<&'a str>,
}

impl<'a> Iterator for HostSuffixIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.remaining?;
        self.remaining = current.find('.').map(|dot| &current[dot + 1..]);
        Some(current)
    }
}

/// Walk a hostname from the full host down to the TLD.
pub fn walk_host_suffixes(host: &str) -> HostSuffixIter<'_> {
    HostSuffixIter {
        remaining: if host.is_empty() { None } else { Some(host) },
    }
}

// =============================================================================
// Domain Pattern Matching
// =============================================================================

/// Match a `$domain=` / cosmetic domain pattern against a hostname.
///
/// Plain patterns are subdomain-inclusive: "example.com" matches both
/// "example.com" and "www.example.com". Wildcard patterns are matched
/// label-wise, with `*` consuming one or more labels: "*.example.com"
/// matches "a.example.com" but not "example.com".
pub fn domain_matches(pattern: &str, hostname: &str) -> bool {
    if pattern.is_empty() || hostname.is_empty() {
        return false;
    }

    if pattern.contains('*') {
        let pattern_labels: Vec<&str> = pattern.split('.').collect();
        let host_labels: Vec<&str> = hostname.split('.').collect();
        return glob_labels(&pattern_labels, &host_labels);
    }

    if hostname == pattern {
        return true;
    }

    hostname.len() > pattern.len()
        && hostname.ends_with(pattern)
        && hostname.as_bytes()[hostname.len() - pattern.len() - 1] == b'.'
}

fn glob_labels(pattern: &[&str], host: &[&str]) -> bool {
    match pattern.split_first() {
        None => host.is_empty(),
        Some((&"*", rest)) => {
            // `*` consumes one or more leading labels
            (1..=host.len()).any(|n| glob_labels(rest, &host[n..]))
        }
        Some((&label, rest)) => match host.split_first() {
            Some((&head, tail)) => head == label && glob_labels(rest, tail),
            None => false,
        },
    }
}
