//! Module-argument parsing.
//!
//! Arguments arrive as a single string of whitespace-separated `key=value`
//! pairs, e.g. `format=s16le rate=48000 channels=2`. Values may be wrapped in
//! single or double quotes.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::{Error, Result};

/// Parsed module arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModArgs {
    values: BTreeMap<String, String>,
}

impl ModArgs {
    /// Parse `input`, rejecting keys not in `valid_keys`.
    pub fn parse(input: &str, valid_keys: &[&str]) -> Result<Self> {
        let mut values = BTreeMap::new();
        let mut rest = input.trim_start();

        while !rest.is_empty() {
            let eq = rest
                .find('=')
                .ok_or_else(|| Error::InvalidArgument(format!("missing '=' in {rest:?}")))?;
            let key = &rest[..eq];
            if key.is_empty() || key.contains(char::is_whitespace) {
                return Err(Error::InvalidArgument(format!("bad key {key:?}")));
            }
            if !valid_keys.contains(&key) {
                return Err(Error::InvalidArgument(format!("unknown key {key:?}")));
            }

            let (value, remaining) = split_value(&rest[eq + 1..])?;
            if values.insert(key.to_string(), value.to_string()).is_some() {
                return Err(Error::InvalidArgument(format!("duplicate key {key:?}")));
            }
            rest = remaining.trim_start();
        }

        Ok(Self { values })
    }

    /// Raw string value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Parse the value for `key`, if present.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|_| Error::InvalidArgument(format!("{key}={raw} is not valid")))
            })
            .transpose()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn split_value(input: &str) -> Result<(&str, &str)> {
    match input.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            let body = &input[1..];
            let end = body
                .find(quote)
                .ok_or_else(|| Error::InvalidArgument(format!("unterminated quote in {input:?}")))?;
            Ok((&body[..end], &body[end + 1..]))
        }
        _ => {
            let end = input.find(char::is_whitespace).unwrap_or(input.len());
            Ok((&input[..end], &input[end..]))
        }
    }
}
