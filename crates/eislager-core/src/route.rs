use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::GatewayError;

fn default_strip_prefix() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub prefix: String,
    pub target: String,
    /// Forward only the part of the path after `prefix`.
    #[serde(default = "default_strip_prefix")]
    pub strip_prefix: bool,
}

impl RouteEntry {
    pub fn new(prefix: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            target: target.into(),
            strip_prefix: true,
        }
    }

    pub fn keep_prefix(mut self) -> Self {
        self.strip_prefix = false;
        self
    }

    /// Prefix match on a segment boundary: `/api/v1/auth` matches
    /// `/api/v1/auth` and `/api/v1/auth/login` but not `/api/v1/authority`.
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || self.prefix.ends_with('/'),
            None => false,
        }
    }

    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> String {
        let forwarded = if self.strip_prefix {
            path.strip_prefix(self.prefix.as_str()).unwrap_or(path)
        } else {
            path
        };

        let base = self.target.trim_end_matches('/');
        let mut url = String::with_capacity(base.len() + forwarded.len() + 1);
        url.push_str(base);
        if !forwarded.starts_with('/') {
            url.push('/');
        }
        url.push_str(forwarded);

        if let Some(query) = query.filter(|query| !query.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    fn validate(&self) -> Result<(), RouteError> {
        if self.prefix.is_empty() {
            return Err(RouteError::EmptyPrefix);
        }
        if !self.prefix.starts_with('/') {
            return Err(RouteError::RelativePrefix(self.prefix.clone()));
        }

        let target = Url::parse(&self.target).map_err(|err| self.invalid_target(err.to_string()))?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(self.invalid_target(format!("unsupported scheme {:?}", target.scheme())));
        }
        if target.host_str().map_or(true, str::is_empty) {
            return Err(self.invalid_target("missing host".to_string()));
        }
        if target.query().is_some() || target.fragment().is_some() {
            return Err(self.invalid_target("query and fragment are not allowed".to_string()));
        }

        Ok(())
    }

    fn invalid_target(&self, reason: String) -> RouteError {
        RouteError::InvalidTarget {
            prefix: self.prefix.clone(),
            target: self.target.clone(),
            reason,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("route prefix must not be empty")]
    EmptyPrefix,
    #[error("route prefix {0:?} must start with '/'")]
    RelativePrefix(String),
    #[error("route target {target:?} for prefix {prefix:?} is not an absolute http(s) URL: {reason}")]
    InvalidTarget {
        prefix: String,
        target: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub index: usize,
    pub entry: &'a RouteEntry,
    pub upstream_url: String,
}

/// Ordered prefix table. Entries are consulted in declaration order and the
/// first prefix matching the path wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new(entries: Vec<RouteEntry>) -> Result<Self, RouteError> {
        for entry in &entries {
            entry.validate()?;
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve(&self, path: &str, query: Option<&str>) -> Result<RouteMatch<'_>, GatewayError> {
        self.entries
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.matches(path))
            .map(|(index, entry)| RouteMatch {
                index,
                entry,
                upstream_url: entry.upstream_url(path, query),
            })
            .ok_or_else(|| GatewayError::RouteNotFound {
                path: path.to_string(),
            })
    }
}
