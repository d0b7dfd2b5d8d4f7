//! Cookie filtering state machine
//!
//! `$cookie` rules act across both phases of an HTTP transaction. During the
//! request phase the `Cookie` header is filtered in place and the work left
//! to do is recorded per request id; during the response phase the schedule
//! is drained against the host's [`CookieApi`]. For one request id the
//! request phase strictly precedes the response phase; different request ids
//! never interact.

use std::collections::HashMap;

use crate::engine::network::IndexedNetworkRule;
use crate::events::FilteringLog;
use crate::request::Request;

// =============================================================================
// Collaborator Types
// =============================================================================

/// One HTTP header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

impl HttpHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A cookie as stored by the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub same_site: Option<String>,
    /// Remaining lifetime in seconds; `None` is a session cookie.
    pub max_age: Option<u64>,
}

/// Capability set over the browser cookie store. The engine issues calls
/// sequentially; serialization is the implementor's concern.
pub trait CookieApi {
    fn remove_cookie(&mut self, name: &str, url: &str);
    fn modify_cookie(&mut self, cookie: &BrowserCookie, url: &str);
    fn get_cookies(&self, name: &str, url: &str) -> Vec<BrowserCookie>;
}

// =============================================================================
// Schedule
// =============================================================================

/// Work recorded during the request phase for one cookie.
#[derive(Debug, Clone)]
pub struct CookieScheduleEntry {
    pub name: String,
    pub url: String,
    pub rules: Vec<IndexedNetworkRule>,
    pub remove: bool,
}

/// Correlates request-phase and response-phase cookie work.
#[derive(Default)]
pub struct CookieFiltering {
    schedule: HashMap<u64, Vec<CookieScheduleEntry>>,
}

impl CookieFiltering {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries scheduled for a request id.
    pub fn scheduled(&self, request_id: u64) -> &[CookieScheduleEntry] {
        self.schedule
            .get(&request_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Request phase: filter the `Cookie` header in place and schedule the
    /// response-phase work. Returns whether the headers were modified.
    pub fn process_request_headers(
        &mut self,
        request: &Request,
        headers: &mut Vec<HttpHeader>,
        cookie_rules: &[IndexedNetworkRule],
        log: &dyn FilteringLog,
    ) -> bool {
        if cookie_rules.is_empty() {
            return false;
        }
        let header_pos = match headers
            .iter()
            .position(|h| h.name.eq_ignore_ascii_case("cookie"))
        {
            Some(pos) => pos,
            None => return false,
        };

        let pairs = parse_cookie_header(&headers[header_pos].value);
        let mut survivors: Vec<String> = Vec::new();
        let mut entries: Vec<CookieScheduleEntry> = Vec::new();
        let mut removed_any = false;

        for (name, raw) in &pairs {
            let blocking = cookie_rules.iter().find(|r| {
                r.rule
                    .cookie
                    .as_ref()
                    .map_or(false, |c| c.matches(name) && !c.is_modifying())
            });

            if let Some(blocking) = blocking {
                if blocking.rule.is_whitelist() {
                    // Observation only: the cookie stays
                    entries.push(self.entry(request, name, &[blocking.clone()], false));
                    survivors.push(raw.clone());
                } else {
                    removed_any = true;
                    entries.push(self.entry(request, name, &[blocking.clone()], true));
                    log.add_cookie_event(name, &request.url, blocking.index, false);
                }
                // A non-modifying rule settles the cookie; modifying rules
                // no longer apply
                continue;
            }

            let modifying: Vec<IndexedNetworkRule> = cookie_rules
                .iter()
                .filter(|r| {
                    r.rule
                        .cookie
                        .as_ref()
                        .map_or(false, |c| c.matches(name) && c.is_modifying())
                })
                .cloned()
                .collect();
            if !modifying.is_empty() {
                entries.push(self.entry(request, name, &modifying, false));
            }
            survivors.push(raw.clone());
        }

        if let Some(request_id) = request.request_id {
            if !entries.is_empty() {
                self.schedule.entry(request_id).or_default().extend(entries);
            }
        }

        if removed_any {
            if survivors.is_empty() {
                headers.remove(header_pos);
            } else {
                headers[header_pos].value = survivors.join("; ");
            }
        }
        removed_any
    }

    /// Response phase: drain the schedule for a request id against the
    /// cookie store.
    pub fn modify_cookies(
        &mut self,
        request_id: u64,
        api: &mut dyn CookieApi,
        log: &dyn FilteringLog,
    ) {
        let entries = match self.schedule.remove(&request_id) {
            Some(entries) => entries,
            None => return,
        };

        for entry in entries {
            if entry.remove {
                api.remove_cookie(&entry.name, &entry.url);
                continue;
            }

            for mut cookie in api.get_cookies(&entry.name, &entry.url) {
                let mut applied: Vec<u64> = Vec::new();

                for rule in &entry.rules {
                    let modifier = match rule.rule.cookie.as_ref() {
                        Some(modifier) => modifier,
                        None => continue,
                    };
                    let mut changed = false;

                    if let Some(same_site) = modifier.same_site() {
                        if cookie.same_site.as_deref() != Some(same_site) {
                            cookie.same_site = Some(same_site.to_string());
                            changed = true;
                        }
                    }
                    if let Some(max_age) = modifier.max_age() {
                        // Only ever shorten a cookie's lifetime
                        if max_age > 0 && cookie.max_age.map_or(true, |current| max_age < current)
                        {
                            cookie.max_age = Some(max_age);
                            changed = true;
                        }
                    }

                    if changed {
                        applied.push(rule.index);
                    }
                }

                if !applied.is_empty() {
                    api.modify_cookie(&cookie, &entry.url);
                    for index in applied {
                        log.add_cookie_event(&cookie.name, &entry.url, index, true);
                    }
                }
            }
        }
    }

    fn entry(
        &self,
        request: &Request,
        name: &str,
        rules: &[IndexedNetworkRule],
        remove: bool,
    ) -> CookieScheduleEntry {
        CookieScheduleEntry {
            name: name.to_string(),
            url: request.url.clone(),
            rules: rules.to_vec(),
            remove,
        }
    }
}

/// Parse a `Cookie` header value into `(name, raw_pair)` tuples.
fn parse_cookie_header(value: &str) -> Vec<(String, String)> {
    value
        .split(';')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            let name = match part.split_once('=') {
                Some((name, _)) => name.trim(),
                None => part,
            };
            Some((name.to_string(), part.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullFilteringLog;
    use crate::request::RequestType;
    use crate::rules::network::NetworkRule;
    use std::sync::Arc;

    #[derive(Default)]
    struct TestCookieApi {
        cookies: Vec<BrowserCookie>,
        removed: Vec<String>,
        modified: Vec<BrowserCookie>,
    }

    impl CookieApi for TestCookieApi {
        fn remove_cookie(&mut self, name: &str, _url: &str) {
            self.removed.push(name.to_string());
        }

        fn modify_cookie(&mut self, cookie: &BrowserCookie, _url: &str) {
            self.modified.push(cookie.clone());
        }

        fn get_cookies(&self, name: &str, _url: &str) -> Vec<BrowserCookie> {
            self.cookies
                .iter()
                .filter(|c| c.name == name)
                .cloned()
                .collect()
        }
    }

    fn cookie_rule(text: &str, index: u64) -> IndexedNetworkRule {
        IndexedNetworkRule {
            rule: Arc::new(NetworkRule::parse(text, 1).unwrap()),
            index,
        }
    }

    fn request(id: u64) -> Request {
        Request::new("https://site.com/page", None, RequestType::Document).with_id(id)
    }

    fn cookie_headers(value: &str) -> Vec<HttpHeader> {
        vec![
            HttpHeader::new("Accept", "*/*"),
            HttpHeader::new("Cookie", value),
        ]
    }

    #[test]
    fn test_blocking_rule_rewrites_header() {
        let mut filtering = CookieFiltering::new();
        let rules = [cookie_rule("||site.com^$cookie=tracker", 0)];
        let mut headers = cookie_headers("tracker=1; JSESSIONID=x");

        let modified = filtering.process_request_headers(
            &request(1),
            &mut headers,
            &rules,
            &NullFilteringLog,
        );

        assert!(modified);
        assert_eq!(headers[1].value, "JSESSIONID=x");

        let scheduled = filtering.scheduled(1);
        assert_eq!(scheduled.len(), 1);
        assert!(scheduled[0].remove);
        assert_eq!(scheduled[0].name, "tracker");
    }

    #[test]
    fn test_blocked_cookie_removed_in_response_phase() {
        let mut filtering = CookieFiltering::new();
        let rules = [cookie_rule("||site.com^$cookie=tracker", 0)];
        let mut headers = cookie_headers("tracker=1; JSESSIONID=x");
        filtering.process_request_headers(&request(1), &mut headers, &rules, &NullFilteringLog);

        let mut api = TestCookieApi::default();
        filtering.modify_cookies(1, &mut api, &NullFilteringLog);

        assert_eq!(api.removed, vec!["tracker"]);
        assert!(api.modified.is_empty());
        assert!(filtering.scheduled(1).is_empty());
    }

    #[test]
    fn test_modifying_rule_keeps_header_and_tightens_max_age() {
        let mut filtering = CookieFiltering::new();
        let rules = [cookie_rule("||site.com^$cookie=tracker,maxAge=60", 0)];
        let mut headers = cookie_headers("tracker=1; JSESSIONID=x");

        let modified = filtering.process_request_headers(
            &request(1),
            &mut headers,
            &rules,
            &NullFilteringLog,
        );
        assert!(!modified);
        assert_eq!(headers[1].value, "tracker=1; JSESSIONID=x");

        let mut api = TestCookieApi::default();
        api.cookies.push(BrowserCookie {
            name: "tracker".to_string(),
            value: "1".to_string(),
            same_site: None,
            max_age: None,
        });
        filtering.modify_cookies(1, &mut api, &NullFilteringLog);

        assert!(api.removed.is_empty());
        assert_eq!(api.modified.len(), 1);
        assert!(api.modified[0].max_age.unwrap() <= 60);
    }

    #[test]
    fn test_max_age_never_extends() {
        let mut filtering = CookieFiltering::new();
        let rules = [cookie_rule("||site.com^$cookie=tracker,maxAge=600", 0)];
        let mut headers = cookie_headers("tracker=1");
        filtering.process_request_headers(&request(1), &mut headers, &rules, &NullFilteringLog);

        let mut api = TestCookieApi::default();
        api.cookies.push(BrowserCookie {
            name: "tracker".to_string(),
            value: "1".to_string(),
            same_site: None,
            max_age: Some(30),
        });
        filtering.modify_cookies(1, &mut api, &NullFilteringLog);

        // 600 would extend the 30-second lifetime; nothing to do
        assert!(api.modified.is_empty());
    }

    #[test]
    fn test_same_site_override() {
        let mut filtering = CookieFiltering::new();
        let rules = [cookie_rule("||site.com^$cookie=track,sameSite=lax", 0)];
        let mut headers = cookie_headers("track=1");
        filtering.process_request_headers(&request(1), &mut headers, &rules, &NullFilteringLog);

        let mut api = TestCookieApi::default();
        api.cookies.push(BrowserCookie {
            name: "track".to_string(),
            value: "1".to_string(),
            same_site: Some("strict".to_string()),
            max_age: None,
        });
        filtering.modify_cookies(1, &mut api, &NullFilteringLog);

        assert_eq!(api.modified.len(), 1);
        assert_eq!(api.modified[0].same_site.as_deref(), Some("lax"));
    }

    #[test]
    fn test_whitelist_rule_observes_only() {
        let mut filtering = CookieFiltering::new();
        let rules = [cookie_rule("@@||site.com^$cookie=tracker", 0)];
        let mut headers = cookie_headers("tracker=1");

        let modified = filtering.process_request_headers(
            &request(1),
            &mut headers,
            &rules,
            &NullFilteringLog,
        );

        assert!(!modified);
        assert_eq!(headers[1].value, "tracker=1");
        let scheduled = filtering.scheduled(1);
        assert_eq!(scheduled.len(), 1);
        assert!(!scheduled[0].remove);

        let mut api = TestCookieApi::default();
        filtering.modify_cookies(1, &mut api, &NullFilteringLog);
        assert!(api.removed.is_empty());
        assert!(api.modified.is_empty());
    }

    #[test]
    fn test_blocking_rule_suppresses_modifying_rules() {
        let mut filtering = CookieFiltering::new();
        let rules = [
            cookie_rule("||site.com^$cookie=tracker", 0),
            cookie_rule("||site.com^$cookie=tracker,maxAge=60", 1),
        ];
        let mut headers = cookie_headers("tracker=1");
        filtering.process_request_headers(&request(1), &mut headers, &rules, &NullFilteringLog);

        let scheduled = filtering.scheduled(1);
        assert_eq!(scheduled.len(), 1);
        assert!(scheduled[0].remove);
    }

    #[test]
    fn test_all_cookies_blocked_removes_header() {
        let mut filtering = CookieFiltering::new();
        let rules = [cookie_rule("||site.com^$cookie", 0)];
        let mut headers = cookie_headers("a=1; b=2");
        let modified = filtering.process_request_headers(
            &request(1),
            &mut headers,
            &rules,
            &NullFilteringLog,
        );
        assert!(modified);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].name, "Accept");
    }

    #[test]
    fn test_request_ids_are_independent() {
        let mut filtering = CookieFiltering::new();
        let rules = [cookie_rule("||site.com^$cookie=tracker", 0)];

        let mut headers_a = cookie_headers("tracker=1");
        filtering.process_request_headers(&request(1), &mut headers_a, &rules, &NullFilteringLog);
        let mut headers_b = cookie_headers("tracker=2");
        filtering.process_request_headers(&request(2), &mut headers_b, &rules, &NullFilteringLog);

        let mut api = TestCookieApi::default();
        filtering.modify_cookies(1, &mut api, &NullFilteringLog);
        assert_eq!(api.removed.len(), 1);
        assert_eq!(filtering.scheduled(1).len(), 0);
        assert_eq!(filtering.scheduled(2).len(), 1);
    }
}
