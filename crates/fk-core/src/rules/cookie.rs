//! `$cookie` advanced modifier
//!
//! Carries the cookie name pattern plus the optional `sameSite` and `maxAge`
//! fields: `$cookie=tracker;maxAge=3600;sameSite=lax`. An empty value matches
//! every cookie, a `/…/` value is a regular expression over the cookie name.

use regex::Regex;

#[derive(Debug, Clone, Default)]
pub struct CookieModifier {
    name: Option<String>,
    name_regex: Option<Regex>,
    same_site: Option<String>,
    max_age: Option<u64>,
}

impl CookieModifier {
    /// Parse the modifier value, e.g. `tracker;maxAge=60;sameSite=lax`.
    pub fn parse(value: &str) -> Result<Self, String> {
        let mut modifier = Self::default();

        for (i, part) in value.split(';').enumerate() {
            let part = part.trim();
            if i == 0 {
                if part.is_empty() {
                    continue;
                }
                if part.len() > 1 && part.starts_with('/') && part.ends_with('/') {
                    let pattern = &part[1..part.len() - 1];
                    let regex = Regex::new(pattern)
                        .map_err(|e| format!("invalid cookie name regex: {e}"))?;
                    modifier.name_regex = Some(regex);
                } else {
                    modifier.name = Some(part.to_string());
                }
                continue;
            }

            let (key, field_value) = match part.split_once('=') {
                Some(kv) => kv,
                None => return Err(format!("invalid cookie option \"{part}\"")),
            };
            match key.to_ascii_lowercase().as_str() {
                "maxage" => modifier.set_max_age(parse_max_age(field_value)?),
                "samesite" => modifier.set_same_site(field_value),
                _ => return Err(format!("unknown cookie option \"{key}\"")),
            }
        }

        Ok(modifier)
    }

    /// Whether the modifier applies to a cookie with this name.
    pub fn matches(&self, cookie_name: &str) -> bool {
        if let Some(regex) = &self.name_regex {
            return regex.is_match(cookie_name);
        }
        match &self.name {
            Some(name) => name == cookie_name,
            None => true,
        }
    }

    /// A modifier that carries `sameSite` or a positive `maxAge` modifies
    /// cookies instead of blocking them.
    pub fn is_modifying(&self) -> bool {
        self.same_site.is_some() || self.max_age.map_or(false, |v| v > 0)
    }

    pub fn same_site(&self) -> Option<&str> {
        self.same_site.as_deref()
    }

    pub fn max_age(&self) -> Option<u64> {
        self.max_age
    }

    pub(crate) fn set_same_site(&mut self, value: &str) {
        self.same_site = Some(value.to_ascii_lowercase());
    }

    pub(crate) fn set_max_age(&mut self, seconds: u64) {
        self.max_age = Some(seconds);
    }
}

pub(crate) fn parse_max_age(value: &str) -> Result<u64, String> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| format!("invalid maxAge value \"{value}\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_only() {
        let m = CookieModifier::parse("tracker").unwrap();
        assert!(m.matches("tracker"));
        assert!(!m.matches("session"));
        assert!(!m.is_modifying());
    }

    #[test]
    fn test_parse_empty_matches_all() {
        let m = CookieModifier::parse("").unwrap();
        assert!(m.matches("anything"));
    }

    #[test]
    fn test_parse_regex_name() {
        let m = CookieModifier::parse("/^__utm/").unwrap();
        assert!(m.matches("__utma"));
        assert!(!m.matches("session"));
    }

    #[test]
    fn test_parse_fields() {
        let m = CookieModifier::parse("tracker;maxAge=3600;sameSite=Lax").unwrap();
        assert!(m.is_modifying());
        assert_eq!(m.max_age(), Some(3600));
        assert_eq!(m.same_site(), Some("lax"));
    }

    #[test]
    fn test_parse_bad_field() {
        assert!(CookieModifier::parse("tracker;maxAge=soon").is_err());
        assert!(CookieModifier::parse("tracker;ttl=5").is_err());
    }
}
