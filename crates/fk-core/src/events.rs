//! Filtering log sink
//!
//! Observation-only interface the host can implement to surface what the
//! engine did. The engine never changes behavior based on the sink.

/// Sink for filtering events.
pub trait FilteringLog {
    /// An HTML filtering rule was applied to page content.
    fn add_html_event(&self, hostname: &str, content: &str, rule_index: u64);

    /// Replace rules were applied to a response body.
    fn add_replace_rules_event(&self, url: &str, rule_indexes: &[u64]);

    /// A cookie was blocked (`modified = false`) or rewritten
    /// (`modified = true`).
    fn add_cookie_event(&self, cookie_name: &str, url: &str, rule_index: u64, modified: bool);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFilteringLog;

impl FilteringLog for NullFilteringLog {
    fn add_html_event(&self, _hostname: &str, _content: &str, _rule_index: u64) {}

    fn add_replace_rules_event(&self, _url: &str, _rule_indexes: &[u64]) {}

    fn add_cookie_event(&self, _cookie_name: &str, _url: &str, _rule_index: u64, _modified: bool) {
    }
}
