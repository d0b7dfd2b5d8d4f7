//! Rule storage
//!
//! Storage owns the raw filter-list texts and assigns each rule a stable
//! 64-bit storage index: the list id in the high 32 bits, the byte offset of
//! the rule within its list in the low 32. Retrieval re-parses the line at
//! that offset, so an index stays valid for the storage's lifetime and an
//! unknown index is simply a miss.

use crate::error::EngineError;
use crate::reader::StringLineReader;
use crate::rules::network::NetworkRule;
use crate::rules::{build_rule, IndexedRule, Rule};
use crate::scanner::{convert_hosts_line, RuleScanner, ScannerFlags};

/// One filter list: an id and its raw text.
#[derive(Debug, Clone)]
pub struct RuleList {
    pub id: u32,
    pub text: String,
}

impl RuleList {
    pub fn new(id: u32, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}

/// Combine a list id and an in-list byte offset into a storage index.
#[inline]
pub fn storage_index(list_id: u32, offset: u32) -> u64 {
    ((list_id as u64) << 32) | offset as u64
}

#[inline]
fn split_index(index: u64) -> (u32, u32) {
    ((index >> 32) as u32, index as u32)
}

// =============================================================================
// Storage
// =============================================================================

/// An ordered collection of filter lists.
pub struct RuleStorage {
    lists: Vec<RuleList>,
}

impl RuleStorage {
    pub fn new(lists: Vec<RuleList>) -> Result<Self, EngineError> {
        let mut storage = Self { lists: Vec::new() };
        for list in lists {
            storage.add_list(list)?;
        }
        Ok(storage)
    }

    pub fn add_list(&mut self, list: RuleList) -> Result<(), EngineError> {
        if self.lists.iter().any(|l| l.id == list.id) {
            return Err(EngineError::InvalidConfiguration(format!(
                "duplicate filter list id {}",
                list.id
            )));
        }
        self.lists.push(list);
        Ok(())
    }

    pub fn lists(&self) -> &[RuleList] {
        &self.lists
    }

    /// Create a forward, single-pass scanner over all lists in order.
    pub fn create_scanner(&self, flags: ScannerFlags) -> StorageScanner<'_> {
        StorageScanner {
            storage: self,
            flags,
            list_index: 0,
            inner: None,
        }
    }

    /// Retrieve the rule behind a storage index.
    ///
    /// Returns `None` for an unknown index; callers treat a miss as "rule
    /// removed".
    pub fn retrieve(&self, index: u64) -> Option<Rule> {
        let (list_id, offset) = split_index(index);
        let list = self.lists.iter().find(|l| l.id == list_id)?;
        let offset = offset as usize;
        if offset >= list.text.len() || !list.text.is_char_boundary(offset) {
            return None;
        }

        let rest = &list.text[offset..];
        let line = match rest.find('\n') {
            Some(end) => &rest[..end],
            None => rest,
        };

        if let Ok(Some(rule)) = build_rule(line, list_id) {
            return Some(rule);
        }
        // The line may be a hosts-file entry stored by a hosts-mode scan
        let converted = convert_hosts_line(line.trim())?;
        NetworkRule::parse(&converted, list_id).ok().map(Rule::Network)
    }

    /// Retrieve a network rule, ignoring anything else at the index.
    pub fn retrieve_network(&self, index: u64) -> Option<NetworkRule> {
        match self.retrieve(index)? {
            Rule::Network(rule) => Some(rule),
            Rule::Cosmetic(_) => None,
        }
    }
}

// =============================================================================
// Storage Scanner
// =============================================================================

/// Scans every list in a storage, producing storage-wide indexes.
pub struct StorageScanner<'a> {
    storage: &'a RuleStorage,
    flags: ScannerFlags,
    list_index: usize,
    inner: Option<RuleScanner<StringLineReader<'a>>>,
}

impl StorageScanner<'_> {
    /// Advance to the next rule across list boundaries.
    pub fn scan(&mut self) -> bool {
        loop {
            if self.inner.is_none() {
                let list = match self.storage.lists.get(self.list_index) {
                    Some(list) => list,
                    None => return false,
                };
                self.inner = Some(RuleScanner::new(
                    StringLineReader::new(&list.text),
                    list.id,
                    self.flags,
                ));
            }

            if let Some(scanner) = self.inner.as_mut() {
                if scanner.scan() {
                    return true;
                }
            }
            self.inner = None;
            self.list_index += 1;
        }
    }

    /// The current rule with its storage-wide index.
    pub fn get_rule(&self) -> Option<IndexedRule> {
        let scanner = self.inner.as_ref()?;
        let indexed = scanner.get_rule()?;
        let list = self.storage.lists.get(self.list_index)?;
        Some(IndexedRule {
            rule: indexed.rule.clone(),
            index: storage_index(list.id, indexed.index as u32),
        })
    }
}
