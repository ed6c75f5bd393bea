use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Grouping unit for aggregation: the request origin as `scheme://host[:port]`.
///
/// The port only appears when it differs from the scheme default, so
/// `https://a.com` and `https://a.com:443` are the same profile while
/// `http://a.com` is a different one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile(String);

impl Profile {
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?;
        let origin = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };
        Some(Self(origin.to_ascii_lowercase()))
    }

    /// Accepts either a full origin (`https://a.com`) or a bare host (`a.com`),
    /// which is taken to mean https.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }
        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };
        Url::parse(&candidate).ok().and_then(|url| Self::from_url(&url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The origin without its scheme, e.g. `a.com:8080`.
    pub fn host(&self) -> &str {
        self.0
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier the interception layer assigns to one in-flight request.
/// Only unique while that request is alive; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Hosts hand out ids as strings or as integers.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(id) => RequestId(id),
            RawId::Number(id) => RequestId(id.to_string()),
        })
    }
}

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}
