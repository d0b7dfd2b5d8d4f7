//! Rule scanner
//!
//! Drives a line reader through the parser, yielding [`IndexedRule`]s. The
//! scanner is forward-only and single-pass; the index of each rule is the
//! byte offset of its line within the source, which is why readers hand back
//! lines with their trailing newline intact.

use std::net::IpAddr;

use crate::reader::LineReader;
use crate::rules::network::NetworkRule;
use crate::rules::{build_rule, cosmetic, is_comment, IndexedRule, Rule};

bitflags::bitflags! {
    /// What the scanner should produce.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScannerFlags: u8 {
        /// Skip cosmetic rules entirely.
        const IGNORE_COSMETIC = 1 << 0;
        /// Convert hosts-file lines (`IP HOSTNAME`) into `||HOSTNAME^` rules.
        const HOSTS_MODE = 1 << 1;
    }
}

/// Lazily scans a line source for rules.
pub struct RuleScanner<R> {
    reader: R,
    list_id: u32,
    flags: ScannerFlags,
    current_pos: u64,
    current: Option<IndexedRule>,
}

impl<R: LineReader> RuleScanner<R> {
    pub fn new(reader: R, list_id: u32, flags: ScannerFlags) -> Self {
        Self {
            reader,
            list_id,
            flags,
            current_pos: 0,
            current: None,
        }
    }

    /// Advance to the next rule. Returns false when the source is exhausted.
    ///
    /// Lines that fail to parse are logged and skipped; a bad rule never
    /// aborts the scan.
    pub fn scan(&mut self) -> bool {
        loop {
            let line_start = self.current_pos;
            let line = match self.reader.read_line() {
                Some(line) => line,
                None => {
                    self.current = None;
                    return false;
                }
            };
            self.current_pos += line.len() as u64;

            match scan_line(line, self.list_id, self.flags) {
                Ok(Some(rule)) => {
                    self.current = Some(IndexedRule {
                        rule,
                        index: line_start,
                    });
                    return true;
                }
                Ok(None) => {}
                Err(err) => log::debug!("list {}: {err}", self.list_id),
            }
        }
    }

    /// The rule produced by the last successful `scan`.
    pub fn get_rule(&self) -> Option<&IndexedRule> {
        self.current.as_ref()
    }
}

fn scan_line(
    line: &str,
    list_id: u32,
    flags: ScannerFlags,
) -> Result<Option<Rule>, crate::error::RuleSyntaxError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || is_comment(line) {
        return Ok(None);
    }

    if flags.contains(ScannerFlags::HOSTS_MODE) {
        // Hosts files use bare-# comments without the trailing space
        if trimmed.starts_with('#') {
            return Ok(None);
        }
        if let Some(converted) = convert_hosts_line(trimmed) {
            return NetworkRule::parse(&converted, list_id).map(|r| Some(Rule::Network(r)));
        }
    }

    if flags.contains(ScannerFlags::IGNORE_COSMETIC)
        && cosmetic::find_cosmetic_marker(trimmed).is_some()
    {
        return Ok(None);
    }

    build_rule(line, list_id)
}

/// Convert a hosts-file line into a domain-anchored rule.
pub(crate) fn convert_hosts_line(line: &str) -> Option<String> {
    let mut parts = line.split_whitespace();
    let ip = parts.next()?;
    let host = parts.next()?;
    if ip.parse::<IpAddr>().is_err() {
        return None;
    }
    Some(format!("||{host}^"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::StringLineReader;
    use std::fmt::Write;

    fn collect(text: &str, flags: ScannerFlags) -> Vec<IndexedRule> {
        let mut scanner = RuleScanner::new(StringLineReader::new(text), 1, flags);
        let mut rules = Vec::new();
        while scanner.scan() {
            rules.push(scanner.get_rule().unwrap().clone());
        }
        rules
    }

    #[test]
    fn test_scan_counts_and_offsets() {
        let text = "||example.org\n! test\n##banner";
        let rules = collect(text, ScannerFlags::empty());
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].index, 0);
        assert_eq!(rules[1].index, 21);
        assert!(matches!(rules[0].rule, Rule::Network(_)));
        assert!(matches!(rules[1].rule, Rule::Cosmetic(_)));
    }

    #[test]
    fn test_scan_skips_bad_rules() {
        let text = "||good.example^\n||bad.example^$nonsense\n##ok";
        let rules = collect(text, ScannerFlags::empty());
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn test_scan_indexes_strictly_increasing() {
        let mut text = String::new();
        for i in 0..50 {
            writeln!(text, "||host{i}.example^").unwrap();
            writeln!(text, "! comment {i}").unwrap();
        }
        let rules = collect(&text, ScannerFlags::empty());
        assert_eq!(rules.len(), 50);
        for pair in rules.windows(2) {
            assert!(pair[0].index < pair[1].index);
        }
    }

    #[test]
    fn test_scan_ignore_cosmetic() {
        let text = "||example.org^\nexample.org##.ad\n";
        let rules = collect(text, ScannerFlags::IGNORE_COSMETIC);
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_scan_hosts_mode() {
        let mut text = String::from("# generated hosts file\n127.0.0.1 localhost\n");
        for i in 0..1000 {
            writeln!(text, "0.0.0.0 host{i}.tracker.example").unwrap();
        }
        let rules = collect(
            &text,
            ScannerFlags::HOSTS_MODE | ScannerFlags::IGNORE_COSMETIC,
        );
        assert_eq!(rules.len(), 1001);

        match &rules[1].rule {
            Rule::Network(rule) => {
                assert_eq!(rule.text, "||host0.tracker.example^");
                assert_eq!(rule.shortcut, "host0.tracker.example");
            }
            other => panic!("expected network rule, got {other:?}"),
        }
    }

    #[test]
    fn test_convert_hosts_line() {
        assert_eq!(
            convert_hosts_line("0.0.0.0 ads.example.com"),
            Some("||ads.example.com^".to_string())
        );
        assert_eq!(convert_hosts_line("not-an-ip ads.example.com"), None);
        assert_eq!(convert_hosts_line("0.0.0.0"), None);
    }

    #[test]
    fn test_scanner_not_restartable() {
        let mut scanner = RuleScanner::new(
            StringLineReader::new("||example.org^"),
            1,
            ScannerFlags::empty(),
        );
        assert!(scanner.scan());
        assert!(!scanner.scan());
        assert!(scanner.get_rule().is_none());
    }
}
