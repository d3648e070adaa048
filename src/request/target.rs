//! Outbound URL construction: one fixed endpoint with a single identifier
//! substituted per item, either into the path or as a query parameter.

use anyhow::{bail, Context, Result};
use reqwest::Url;

/// Placeholder replaced by the percent-encoded item identifier.
pub const ID_PLACEHOLDER: &str = "{id}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTarget {
    /// `{id}` inside the endpoint is replaced by the encoded identifier.
    Template { template: String },
    /// The identifier is appended as `?<param>=<id>`, keeping any existing
    /// query pairs.
    Query { base: Url, param: String },
}

impl RequestTarget {
    pub fn new(endpoint: &str, id_param: Option<&str>) -> Result<Self> {
        let endpoint = endpoint.trim();
        match id_param.map(str::trim).filter(|param| !param.is_empty()) {
            Some(param) => {
                if endpoint.contains(ID_PLACEHOLDER) {
                    bail!("endpoint must not contain {ID_PLACEHOLDER} when id_param is set");
                }
                let base = parse_http_url(endpoint)?;
                Ok(RequestTarget::Query {
                    base,
                    param: param.to_owned(),
                })
            }
            None => {
                if endpoint.matches(ID_PLACEHOLDER).count() != 1 {
                    bail!("endpoint must contain {ID_PLACEHOLDER} exactly once unless id_param is set");
                }
                parse_http_url(&endpoint.replace(ID_PLACEHOLDER, "placeholder"))?;
                Ok(RequestTarget::Template {
                    template: endpoint.to_owned(),
                })
            }
        }
    }

    /// Resolves the URL for one identifier.
    pub fn url_for(&self, identifier: &str) -> Result<Url> {
        match self {
            RequestTarget::Template { template } => {
                let encoded: String = url::form_urlencoded::byte_serialize(identifier.as_bytes())
                    .collect::<String>()
                    .replace('+', "%20");
                let resolved = template.replace(ID_PLACEHOLDER, &encoded);
                Url::parse(&resolved)
                    .with_context(|| format!("failed to build url for identifier '{identifier}'"))
            }
            RequestTarget::Query { base, param } => {
                let mut url = base.clone();
                url.query_pairs_mut().append_pair(param, identifier);
                Ok(url)
            }
        }
    }
}

fn parse_http_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("invalid endpoint '{raw}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("endpoint must start with http:// or https://");
    }
    if url.host_str().is_none() {
        bail!("endpoint '{raw}' has no host");
    }
    Ok(url)
}
