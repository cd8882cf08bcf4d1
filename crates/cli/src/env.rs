// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment-variable defaulting for CLI options.
//!
//! Every option can be defaulted from `LANDFORM_<VERB>_<OPT>` with a
//! fallback to `LANDFORM_<OPT>` (uppercase snake-case). Empty values are
//! ignored with a log note so a blank export cannot silently disable an
//! option.

use std::str::FromStr;

/// Look up the override for an option, most specific first.
pub fn lookup(verb: &str, opt: &str) -> Option<String> {
    let normalized = opt.to_uppercase().replace('-', "_");
    let keys = [
        format!("LANDFORM_{}_{normalized}", verb.to_uppercase().replace('-', "_")),
        format!("LANDFORM_{normalized}"),
    ];
    for key in keys {
        match std::env::var(&key) {
            Ok(value) if value.is_empty() => {
                tracing::info!(var = %key, "ignoring empty environment override");
            }
            Ok(value) => return Some(value),
            Err(_) => {}
        }
    }
    None
}

/// Parse an environment override; unparseable values are logged and
/// ignored rather than failing startup.
pub fn parse<T: FromStr>(verb: &str, opt: &str) -> Option<T> {
    let raw = lookup(verb, opt)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(option = opt, value = %raw, "unparseable environment override ignored");
            None
        }
    }
}

/// Boolean override: accepts 1/0, true/false, yes/no.
pub fn flag(verb: &str, opt: &str) -> Option<bool> {
    let raw = lookup(verb, opt)?;
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        other => {
            tracing::warn!(option = opt, value = other, "unparseable boolean override ignored");
            None
        }
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
