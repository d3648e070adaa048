//! Fixed request header set shared by every item request in a run.

use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Parses `name: value` pairs, one per line.
///
/// Blank entries are skipped. A header named twice keeps both values, in
/// order.
pub fn parse_header_list(raw: &str) -> Result<Vec<(String, String)>> {
    let mut headers = Vec::new();
    for entry in raw.lines() {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let Some((name, value)) = entry.split_once(':') else {
            bail!("header entry '{entry}' must look like 'name: value'");
        };
        let name = name.trim();
        if name.is_empty() {
            bail!("header entry '{entry}' has an empty name");
        }
        headers.push((name.to_owned(), value.trim().to_owned()));
    }
    Ok(headers)
}

pub(crate) fn build_header_map(headers: &[(String, String)]) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("invalid header name '{name}'"))?;
        let header_value = HeaderValue::from_str(value)
            .with_context(|| format!("invalid value for header '{name}'"))?;
        map.append(header_name, header_value);
    }
    Ok(map)
}
