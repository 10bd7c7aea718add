//! Host name pattern resolution.
//!
//! A pattern such as `ec2.{name}` or `{profile}.{id}` is turned into a regular
//! expression with one named group per placeholder. The host argument given to
//! the ProxyCommand is matched against it to pick the EC2 filter.

use regex::Regex;

use crate::error::{ProxyError, Result};

const PLACEHOLDERS: [(&str, &str); 3] = [
    ("{name}", r"(?P<name>[A-Za-z0-9_-]+)"),
    ("{id}", r"(?P<id>[A-Za-z0-9_-]+)"),
    ("{profile}", r"(?P<profile>[A-Za-z0-9_-]+)"),
];

/// Attributes extracted from a host name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostAttributes {
    pub name: Option<String>,
    pub id: Option<String>,
    pub profile: Option<String>,
}

/// Instance filter selected by a host name. Exactly one of name/id is ever set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceFilter {
    /// Value of the `Name` tag.
    Name(String),
    /// Literal instance id.
    Id(String),
}

impl HostAttributes {
    pub fn filter(&self) -> Option<InstanceFilter> {
        match (&self.name, &self.id) {
            (Some(name), None) => Some(InstanceFilter::Name(name.clone())),
            (None, Some(id)) => Some(InstanceFilter::Id(id.clone())),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct HostPattern {
    regex: Regex,
}

impl HostPattern {
    pub fn compile(template: &str) -> Result<Self> {
        let mut pattern = template.to_string();
        for (placeholder, group) in PLACEHOLDERS {
            pattern = pattern.replace(placeholder, group);
        }

        let regex = Regex::new(&pattern)
            .map_err(|_| ProxyError::InvalidPattern(template.to_string()))?;

        Ok(Self { regex })
    }

    /// Matches `hostname` and validates that it names exactly one of name/id.
    pub fn resolve(&self, hostname: &str) -> Result<HostAttributes> {
        let mut attrs = HostAttributes::default();

        if let Some(caps) = self.regex.captures(hostname) {
            let group = |key: &str| {
                caps.name(key)
                    .map(|m| m.as_str())
                    .filter(|v| !v.is_empty())
                    .map(String::from)
            };
            attrs.name = group("name");
            attrs.id = group("id");
            attrs.profile = group("profile");
        }

        match (&attrs.name, &attrs.id) {
            (Some(_), Some(_)) => Err(ProxyError::AmbiguousHost(hostname.to_string())),
            (None, None) => Err(ProxyError::UnresolvedHost(hostname.to_string())),
            _ => Ok(attrs),
        }
    }
}

/// Compiles `template` and resolves `hostname` against it.
pub fn resolve_host(template: &str, hostname: &str) -> Result<HostAttributes> {
    HostPattern::compile(template)?.resolve(hostname)
}
