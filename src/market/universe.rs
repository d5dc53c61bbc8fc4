//! Instrument dump and watchlist loading.
//!
//! The broker's `instruments.csv` maps trading symbols to tokens. The
//! watchlist is a plain text file, one symbol per line. Both are read once
//! at startup; failures here are fatal.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::types::Instrument;

/// The subset of instrument-dump columns we use.
#[derive(Debug, Deserialize)]
struct InstrumentRow {
    instrument_token: u32,
    tradingsymbol: String,
    exchange: String,
    #[serde(default)]
    instrument_type: String,
}

/// Symbol → instrument lookup, immutable after load.
#[derive(Debug, Clone, Default)]
pub struct InstrumentMap {
    by_symbol: HashMap<String, Instrument>,
}

impl InstrumentMap {
    pub fn from_instruments(instruments: impl IntoIterator<Item = Instrument>) -> Self {
        let mut map = Self::default();
        for inst in instruments {
            map.by_symbol.insert(inst.symbol.clone(), inst);
        }
        map
    }

    /// Load from a CSV instrument dump, keeping rows on `exchange` and,
    /// if given, of `instrument_type`.
    pub fn load_csv(
        path: impl AsRef<Path>,
        exchange: &str,
        instrument_type: Option<&str>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open instrument file: {}", path.display()))?;

        let mut kept = Vec::new();
        let mut bad_rows = 0usize;
        for row in reader.deserialize::<InstrumentRow>() {
            let row = match row {
                Ok(r) => r,
                Err(_) => {
                    bad_rows += 1;
                    continue;
                }
            };
            if row.exchange != exchange {
                continue;
            }
            if instrument_type.is_some_and(|t| row.instrument_type != t) {
                continue;
            }
            kept.push(Instrument {
                symbol: row.tradingsymbol,
                token: row.instrument_token,
                exchange: row.exchange,
                instrument_type: row.instrument_type,
            });
        }

        if bad_rows > 0 {
            warn!(path = %path.display(), bad_rows, "Skipped unparseable instrument rows");
        }
        info!(path = %path.display(), exchange, count = kept.len(), "Instruments loaded");

        Ok(Self::from_instruments(kept))
    }

    pub fn get(&self, symbol: &str) -> Option<&Instrument> {
        self.by_symbol.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }

    /// Resolve a watchlist in order. Unknown symbols are dropped and
    /// returned separately; duplicates are kept once.
    pub fn resolve(&self, watchlist: &[String]) -> (Vec<Instrument>, Vec<String>) {
        let mut resolved: Vec<Instrument> = Vec::with_capacity(watchlist.len());
        let mut missing = Vec::new();
        for symbol in watchlist {
            match self.get(symbol) {
                Some(inst) if !resolved.iter().any(|r| r.token == inst.token) => {
                    resolved.push(inst.clone())
                }
                Some(_) => {}
                None => missing.push(symbol.clone()),
            }
        }
        (resolved, missing)
    }
}

/// Read non-empty, non-comment lines from a text file.
pub fn load_lines(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(parse_lines(&contents))
}

fn parse_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}
