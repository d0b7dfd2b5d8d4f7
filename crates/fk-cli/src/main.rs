//! FilterKit CLI
//!
//! CLI tool for loading filter lists, matching requests and inspecting
//! cosmetic rules.

use std::fs;

use clap::{Parser, Subcommand};
use serde_json::json;

use fk_core::{
    CosmeticOptions, Engine, EngineConfig, Request, RequestType, RuleList, RuleStorage,
    ScannerFlags,
};

#[derive(Parser)]
#[command(name = "fk-cli")]
#[command(about = "FilterKit filter list tools")]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match one request against the loaded lists
    Match {
        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Request URL
        #[arg(short, long)]
        url: String,

        /// Source (frame) URL
        #[arg(short, long)]
        source: Option<String>,

        /// Request type (document, script, image, ...)
        #[arg(short = 't', long, default_value = "document")]
        request_type: String,

        /// Treat inputs as hosts files
        #[arg(long)]
        hosts: bool,
    },

    /// Print the cosmetic rules for a hostname
    Cosmetic {
        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Hostname to look up
        #[arg(long)]
        hostname: String,
    },

    /// Scan lists and print rule counts
    Scan {
        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Treat inputs as hosts files
        #[arg(long)]
        hosts: bool,

        /// Skip cosmetic rules
        #[arg(long)]
        ignore_cosmetic: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let result = match cli.command {
        Commands::Match {
            input,
            url,
            source,
            request_type,
            hosts,
        } => cmd_match(&input, &url, source.as_deref(), &request_type, hosts, cli.verbose),
        Commands::Cosmetic { input, hostname } => cmd_cosmetic(&input, &hostname, cli.verbose),
        Commands::Scan {
            input,
            hosts,
            ignore_cosmetic,
        } => cmd_scan(&input, hosts, ignore_cosmetic, cli.verbose),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_storage(inputs: &[String]) -> Result<RuleStorage, String> {
    let mut lists = Vec::new();
    for (i, path) in inputs.iter().enumerate() {
        let text =
            fs::read_to_string(path).map_err(|e| format!("Failed to read '{path}': {e}"))?;
        lists.push(RuleList::new(i as u32 + 1, text));
    }
    RuleStorage::new(lists).map_err(|e| e.to_string())
}

fn build_engine(inputs: &[String], hosts: bool, verbose: bool) -> Result<Engine, String> {
    let storage = load_storage(inputs)?;
    let mut scanner_flags = ScannerFlags::empty();
    if hosts {
        scanner_flags |= ScannerFlags::HOSTS_MODE | ScannerFlags::IGNORE_COSMETIC;
    }
    let config = EngineConfig {
        engine: "fk-cli".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        verbose,
        scanner_flags,
    };
    Ok(Engine::new(storage, config))
}

fn cmd_match(
    inputs: &[String],
    url: &str,
    source: Option<&str>,
    request_type: &str,
    hosts: bool,
    verbose: bool,
) -> Result<(), String> {
    let engine = build_engine(inputs, hosts, verbose)?;
    let request = Request::new(url, source, RequestType::from_name(request_type));
    let result = engine.match_request(&request);

    let basic = result.get_basic_result().map(|r| {
        json!({
            "rule": r.rule.text,
            "index": r.index,
            "whitelist": r.rule.is_whitelist(),
        })
    });
    let document = result.document_rule.as_ref().map(|r| {
        json!({
            "rule": r.rule.text,
            "index": r.index,
        })
    });

    let output = json!({
        "url": url,
        "rulesCount": engine.rules_count(),
        "block": result.should_block(),
        "allowlisted": result.is_allowlisted(),
        "basicRule": basic,
        "documentRule": document,
        "cookieRules": result.cookie_rules.iter().map(|r| r.rule.text.clone()).collect::<Vec<_>>(),
        "cspRules": result.csp_rules.iter().map(|r| r.rule.text.clone()).collect::<Vec<_>>(),
        "redirect": result.redirect_rule.as_ref().map(|r| r.rule.text.clone()),
    });
    println!("{}", serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?);

    Ok(())
}

fn cmd_cosmetic(inputs: &[String], hostname: &str, verbose: bool) -> Result<(), String> {
    let engine = build_engine(inputs, false, verbose)?;
    let result = engine.get_cosmetic_result(hostname, CosmeticOptions::ALL);

    let selectors = |rules: &[std::sync::Arc<fk_core::rules::CosmeticRule>]| {
        rules.iter().map(|r| r.content.clone()).collect::<Vec<_>>()
    };
    let output = json!({
        "hostname": hostname,
        "elementHiding": selectors(&result.element_hiding),
        "cssInject": selectors(&result.css),
        "js": selectors(&result.js),
        "html": selectors(&result.html),
    });
    println!("{}", serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?);

    Ok(())
}

fn cmd_scan(
    inputs: &[String],
    hosts: bool,
    ignore_cosmetic: bool,
    verbose: bool,
) -> Result<(), String> {
    let mut scanner_flags = ScannerFlags::empty();
    if hosts {
        scanner_flags |= ScannerFlags::HOSTS_MODE;
    }
    if ignore_cosmetic {
        scanner_flags |= ScannerFlags::IGNORE_COSMETIC;
    }

    let storage = load_storage(inputs)?;
    let mut per_list: Vec<(u32, usize)> = storage.lists().iter().map(|l| (l.id, 0)).collect();
    let mut total = 0usize;

    let mut scanner = storage.create_scanner(scanner_flags);
    while scanner.scan() {
        if let Some(indexed) = scanner.get_rule() {
            let list_id = indexed.rule.filter_list_id();
            if let Some(entry) = per_list.iter_mut().find(|(id, _)| *id == list_id) {
                entry.1 += 1;
            }
            total += 1;
        }
    }

    for ((id, count), path) in per_list.iter().zip(inputs) {
        println!("  [{id}] {path} - {count} rules");
    }
    println!("Total: {total} rules");
    if verbose {
        log::debug!("scanned {} lists", inputs.len());
    }

    Ok(())
}
