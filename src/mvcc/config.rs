//! # Configuration Strings
//!
//! The transaction layer consumes `key=value` configuration strings with
//! hexadecimal timestamps:
//!
//! - `read_timestamp=<hex>` at transaction begin
//! - `commit_timestamp=<hex>`, `durable_timestamp=<hex>`,
//!   `prepare_timestamp=<hex>` via `timestamp_transaction`
//! - `stable_timestamp=<hex>` via `Database::set_timestamp`
//! - checkpoint-cursor open:
//!   `checkpoint=<name>[,debug=(checkpoint_read_timestamp=<hex>)]`
//!
//! Values never contain commas except inside one level of parentheses
//! (the `debug=(...)` group); the splitter tracks nesting depth so the
//! grouped entry stays intact. Unknown keys are rejected so a typo fails
//! loudly instead of being silently ignored.

use eyre::Result;

use super::timestamp::{parse_timestamp, Timestamp};
use crate::error::ErrorCode;
use crate::{bail_code, ensure_code};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxnConfig {
    pub read_ts: Option<Timestamp>,
    pub commit_ts: Option<Timestamp>,
    pub durable_ts: Option<Timestamp>,
    pub prepare_ts: Option<Timestamp>,
    pub stable_ts: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointConfig {
    /// Absent selects the most recent unnamed checkpoint.
    pub name: Option<String>,
    pub debug_read_ts: Option<Timestamp>,
}

/// Parses the timestamp keys the transaction layer understands.
pub fn parse_txn_config(config: &str) -> Result<TxnConfig> {
    let mut cfg = TxnConfig::default();
    for (key, value) in split_config(config)? {
        let slot = match key {
            "read_timestamp" => &mut cfg.read_ts,
            "commit_timestamp" => &mut cfg.commit_ts,
            "durable_timestamp" => &mut cfg.durable_ts,
            "prepare_timestamp" => &mut cfg.prepare_ts,
            "stable_timestamp" => &mut cfg.stable_ts,
            _ => bail_code!(
                ErrorCode::InvalidArgument,
                "unknown configuration key {key:?}"
            ),
        };
        *slot = Some(parse_timestamp(value)?);
    }
    Ok(cfg)
}

/// Parses a checkpoint-cursor open configuration.
pub fn parse_checkpoint_config(config: &str) -> Result<CheckpointConfig> {
    let mut cfg = CheckpointConfig::default();
    for (key, value) in split_config(config)? {
        match key {
            "checkpoint" => {
                ensure_code!(
                    !value.is_empty(),
                    ErrorCode::InvalidArgument,
                    "empty checkpoint name"
                );
                cfg.name = Some(value.to_string());
            }
            "debug" => {
                let inner = value
                    .strip_prefix('(')
                    .and_then(|v| v.strip_suffix(')'));
                let Some(inner) = inner else {
                    bail_code!(
                        ErrorCode::InvalidArgument,
                        "debug configuration must be parenthesized"
                    );
                };
                for (key, value) in split_config(inner)? {
                    match key {
                        "checkpoint_read_timestamp" => {
                            cfg.debug_read_ts = Some(parse_timestamp(value)?);
                        }
                        _ => bail_code!(
                            ErrorCode::InvalidArgument,
                            "unknown debug configuration key {key:?}"
                        ),
                    }
                }
            }
            _ => bail_code!(
                ErrorCode::InvalidArgument,
                "unknown configuration key {key:?}"
            ),
        }
    }
    Ok(cfg)
}

/// Splits a configuration string into `key=value` pairs at top-level commas.
fn split_config(config: &str) -> Result<Vec<(&str, &str)>> {
    let mut pairs = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (idx, ch) in config.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                ensure_code!(
                    depth > 0,
                    ErrorCode::InvalidArgument,
                    "unbalanced parentheses in configuration {config:?}"
                );
                depth -= 1;
            }
            ',' if depth == 0 => {
                push_pair(&mut pairs, &config[start..idx])?;
                start = idx + 1;
            }
            _ => {}
        }
    }
    ensure_code!(
        depth == 0,
        ErrorCode::InvalidArgument,
        "unbalanced parentheses in configuration {config:?}"
    );
    push_pair(&mut pairs, &config[start..])?;
    Ok(pairs)
}

fn push_pair<'a>(pairs: &mut Vec<(&'a str, &'a str)>, item: &'a str) -> Result<()> {
    let item = item.trim();
    if item.is_empty() {
        return Ok(());
    }
    let Some((key, value)) = item.split_once('=') else {
        bail_code!(
            ErrorCode::InvalidArgument,
            "configuration entry {item:?} expects key=value"
        );
    };
    pairs.push((key.trim(), value.trim()));
    Ok(())
}
