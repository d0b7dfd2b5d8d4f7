//! Engine facade
//!
//! Ties the storage scanner to the network and cosmetic indexes and exposes
//! the query surface: `match_request` and `get_cosmetic_result`. The indexes
//! are built once during load and read-only afterwards; every query is
//! synchronous and non-blocking.

pub mod cosmetic;
pub mod network;
pub mod result;

use crate::error::EngineError;
use crate::request::{Request, RequestType};
use crate::rules::Rule;
use crate::scanner::ScannerFlags;
use crate::storage::RuleStorage;

pub use cosmetic::{CosmeticEngine, CosmeticOptions, CosmeticResult};
pub use network::{IndexedNetworkRule, NetworkEngine};
pub use result::MatchingResult;

// =============================================================================
// Configuration
// =============================================================================

/// Per-engine configuration. Never read from ambient state at match time.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Tag identifying the host runtime; echoed in diagnostics, never
    /// interpreted.
    pub engine: String,
    /// Host version, advisory.
    pub version: String,
    /// Emit additional diagnostics through the `log` crate.
    pub verbose: bool,
    /// How the storage is scanned at load time.
    pub scanner_flags: ScannerFlags,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine: String::new(),
            version: String::new(),
            verbose: false,
            scanner_flags: ScannerFlags::empty(),
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// The filtering engine facade.
pub struct Engine {
    storage: RuleStorage,
    config: EngineConfig,
    network: NetworkEngine,
    cosmetic: CosmeticEngine,
}

impl Engine {
    /// Build an engine and load every rule from storage.
    pub fn new(storage: RuleStorage, config: EngineConfig) -> Self {
        Self::with_options(storage, config, false)
    }

    /// Build an engine; with `skip_scan` the indexes stay empty until
    /// `load_rules` (or `load_rules_async`) is called.
    pub fn with_options(storage: RuleStorage, config: EngineConfig, skip_scan: bool) -> Self {
        let mut engine = Self {
            storage,
            config,
            network: NetworkEngine::new(),
            cosmetic: CosmeticEngine::new(),
        };
        if !skip_scan {
            engine.load_rules();
        }
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &RuleStorage {
        &self.storage
    }

    /// Scan the storage and index every rule, without yielding.
    pub fn load_rules(&mut self) {
        self.load_in_chunks(None, &mut || {});
    }

    /// Scan the storage, calling `yield_fn` after every `chunk_size` rules so
    /// the host stays responsive during large loads.
    pub fn load_rules_async(
        &mut self,
        chunk_size: usize,
        yield_fn: &mut dyn FnMut(),
    ) -> Result<(), EngineError> {
        if chunk_size == 0 {
            return Err(EngineError::InvalidConfiguration(
                "chunk size must be positive".to_string(),
            ));
        }
        self.load_in_chunks(Some(chunk_size), yield_fn);
        Ok(())
    }

    fn load_in_chunks(&mut self, chunk_size: Option<usize>, yield_fn: &mut dyn FnMut()) {
        let mut processed = 0usize;
        let mut scanner = self.storage.create_scanner(self.config.scanner_flags);
        while scanner.scan() {
            let indexed = match scanner.get_rule() {
                Some(indexed) => indexed,
                None => continue,
            };
            match indexed.rule {
                Rule::Network(rule) => self.network.add_rule(rule, indexed.index),
                Rule::Cosmetic(rule) => self.cosmetic.add_rule(rule),
            }
            processed += 1;
            if let Some(size) = chunk_size {
                if processed % size == 0 {
                    yield_fn();
                }
            }
        }

        if self.config.verbose {
            log::debug!(
                "{} {}: indexed {} rules",
                self.config.engine,
                self.config.version,
                processed
            );
        }
    }

    /// Number of rules accepted into the indexes.
    pub fn rules_count(&self) -> usize {
        self.network.rules_count() + self.cosmetic.rules_count()
    }

    /// Match a request against the network rules and reduce to a verdict.
    ///
    /// Degenerate input (an empty URL) produces an empty result rather than
    /// an error.
    pub fn match_request(&self, request: &Request) -> MatchingResult {
        if request.url.is_empty() {
            return MatchingResult::default();
        }

        let rules = self.network.match_all(request);
        let source_rules = match request.source_url.as_deref() {
            Some(source) if !source.is_empty() => {
                let source_request = Request::new(source, Some(source), RequestType::Document);
                self.network.match_all(&source_request)
            }
            _ => Vec::new(),
        };

        MatchingResult::new(rules, source_rules)
    }

    /// Cosmetic rules applicable to a hostname, restricted by the option
    /// mask.
    pub fn get_cosmetic_result(&self, hostname: &str, options: CosmeticOptions) -> CosmeticResult {
        self.cosmetic.match_hostname(hostname, options)
    }

    /// Retrieve a rule by storage index; `None` means the index is unknown.
    pub fn retrieve_rule(&self, index: u64) -> Option<Rule> {
        self.storage.retrieve(index)
    }
}
