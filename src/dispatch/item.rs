//! Work items and the pure mapping from an item index to the identifier
//! string carried by its outbound request.

use anyhow::{bail, Result};
use std::fmt;

/// Placeholder substituted with the item index inside an [`IdTemplate`].
pub const INDEX_PLACEHOLDER: &str = "{index}";

/// Template used when no identifier scheme is configured.
pub const DEFAULT_ID_TEMPLATE: &str = "item-{index}";

/// One unit of work: an index in `[0, N)` and the identifier derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    index: u64,
    identifier: String,
}

impl WorkItem {
    pub fn new(index: u64, identifier: impl Into<String>) -> Self {
        Self {
            index,
            identifier: identifier.into(),
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.index, self.identifier)
    }
}

/// Pure function from an item index to its identifier.
///
/// Implementations must be deterministic: the same index always maps to the
/// same identifier, and distinct indices map to distinct identifiers.
pub trait IdentifierScheme: Send + Sync + 'static {
    fn identifier(&self, index: u64) -> String;

    fn work_item(&self, index: u64) -> WorkItem {
        WorkItem::new(index, self.identifier(index))
    }
}

impl<F> IdentifierScheme for F
where
    F: Fn(u64) -> String + Send + Sync + 'static,
{
    fn identifier(&self, index: u64) -> String {
        self(index)
    }
}

/// Identifier scheme that formats a template containing `{index}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdTemplate {
    prefix: String,
    suffix: String,
}

impl IdTemplate {
    /// Parses a template with exactly one `{index}` placeholder.
    pub fn parse(template: &str) -> Result<Self> {
        let template = template.trim();
        let Some((prefix, suffix)) = template.split_once(INDEX_PLACEHOLDER) else {
            bail!("id template '{template}' must contain {INDEX_PLACEHOLDER}");
        };
        if suffix.contains(INDEX_PLACEHOLDER) {
            bail!("id template '{template}' must contain {INDEX_PLACEHOLDER} exactly once");
        }
        Ok(Self {
            prefix: prefix.to_owned(),
            suffix: suffix.to_owned(),
        })
    }
}

impl Default for IdTemplate {
    fn default() -> Self {
        Self {
            prefix: "item-".to_owned(),
            suffix: String::new(),
        }
    }
}

impl fmt::Display for IdTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{INDEX_PLACEHOLDER}{}", self.prefix, self.suffix)
    }
}

impl IdentifierScheme for IdTemplate {
    fn identifier(&self, index: u64) -> String {
        format!("{}{index}{}", self.prefix, self.suffix)
    }
}
