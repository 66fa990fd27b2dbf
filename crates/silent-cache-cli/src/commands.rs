//! Subcommand implementations.
//!
//! Each command writes its result to the given writer so tests can capture it.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use silent_cache::{JsonFetcher, QuerySnapshot, QueryStatus, SilentCache};
use std::io::Write;
use std::time::Duration;

pub fn get(cache: &SilentCache, key: &str, out: &mut impl Write) -> Result<()> {
    match cache.get::<Value>(key) {
        Some(value) => {
            writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
            Ok(())
        }
        None => bail!("No cached value for '{}'", key),
    }
}

pub fn set(cache: &SilentCache, key: &str, raw: &str, out: &mut impl Write) -> Result<()> {
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("Value for '{}' is not JSON", key))?;
    cache.set(key, &value);

    if cache.get::<Value>(key).as_ref() != Some(&value) {
        bail!("Cache rejected the write for '{}'", key);
    }
    writeln!(out, "stored {}", key)?;
    Ok(())
}

pub fn remove(cache: &SilentCache, key: &str, out: &mut impl Write) -> Result<()> {
    if cache.remove(key) {
        writeln!(out, "removed {}", key)?;
    } else {
        writeln!(out, "{} was not cached", key)?;
    }
    Ok(())
}

pub fn remove_prefix(cache: &SilentCache, prefix: &str, out: &mut impl Write) -> Result<()> {
    let removed = cache.remove_prefix(prefix);
    writeln!(out, "removed {} entries", removed)?;
    Ok(())
}

pub fn keys(cache: &SilentCache, prefix: Option<&str>, out: &mut impl Write) -> Result<()> {
    for key in cache
        .keys()
        .into_iter()
        .filter(|k| prefix.map_or(true, |p| k.starts_with(p)))
    {
        writeln!(out, "{}", key)?;
    }
    Ok(())
}

pub fn stats(cache: &SilentCache, out: &mut impl Write) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(&cache.stats())?)?;
    Ok(())
}

pub fn clear(cache: &SilentCache, out: &mut impl Write) -> Result<()> {
    let removed = cache.clear();
    writeln!(out, "removed {} entries", removed)?;
    Ok(())
}

/// Build a fetcher from `NAME:VALUE` header arguments.
pub fn build_fetcher(url: &str, headers: &[String], timeout_secs: u64) -> Result<JsonFetcher<Value>> {
    let mut fetcher = JsonFetcher::with_timeout(url, Duration::from_secs(timeout_secs))?;
    for header in headers {
        let Some((name, value)) = header.split_once(':') else {
            bail!("Header '{}' is not in NAME:VALUE form", header);
        };
        fetcher = fetcher.with_header(name.trim(), value.trim())?;
    }
    Ok(fetcher)
}

fn snapshot_json(snapshot: &QuerySnapshot<Value>) -> Value {
    json!({
        "key": snapshot.key,
        "status": snapshot.status,
        "loading": snapshot.loading,
        "data": snapshot.data,
        "error": snapshot.error.as_ref().map(|e| e.to_string()),
    })
}

fn cached_json(key: &str, cached: Option<Value>) -> Value {
    let status = if cached.is_some() {
        QueryStatus::ServingCached
    } else {
        QueryStatus::Idle
    };
    json!({
        "key": key,
        "status": status,
        "loading": cached.is_none(),
        "data": cached,
        "error": null,
    })
}

/// Print the cached state, then every transition until the refresh settles.
pub async fn watch(
    cache: &SilentCache,
    key: &str,
    fetcher: JsonFetcher<Value>,
    out: &mut impl Write,
) -> Result<()> {
    // Read before subscribing; the refresh may settle before the first snapshot
    writeln!(out, "{}", cached_json(key, cache.get::<Value>(key)))?;

    let mut query = cache.query(key, fetcher);
    let mut snapshot = query.snapshot();
    while snapshot.is_refreshing() {
        writeln!(out, "{}", snapshot_json(&snapshot))?;
        snapshot = query.changed().await;
    }
    writeln!(out, "{}", snapshot_json(&snapshot))?;

    if let Some(error) = snapshot.error {
        if snapshot.data.is_none() {
            bail!("Refresh failed with nothing cached: {}", error);
        }
    }
    Ok(())
}
