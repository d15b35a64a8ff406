//! Route assignment
//!
//! [`route_key`] is the only place a project's routing key is derived. The
//! same string names the container and is the subdomain the reverse proxy
//! routes to it, so the two can never diverge.

use std::collections::BTreeMap;

use crate::models::project::{Project, ProjectId};

/// Maximum length of the sanitized owner segment
pub const OWNER_MAX_LEN: usize = 16;

/// Maximum length of the sanitized project name segment
pub const NAME_MAX_LEN: usize = 24;

/// Label namespace for ownership labels on deployed containers
pub const LABEL_PREFIX: &str = "shipyard";

/// Lower-case, map every char outside `[a-z0-9]` to `-`, collapse dashes,
/// trim dashes, cap the length and fall back when nothing is left.
fn sanitize(text: &str, max_len: usize, fallback: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars().flat_map(char::to_lowercase) {
        let ch = if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            ch
        } else {
            '-'
        };
        if ch == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(ch);
    }

    // Only ASCII is left, so byte truncation is char truncation
    out.truncate(max_len);
    let trimmed = out.trim_matches('-');

    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Derive the routing key for a project.
///
/// `sanitize(owner) + "-" + truncate(sanitize(name)) + "-" + id`. The result
/// is at most 62 chars of `[a-z0-9-]`, starts and ends with an alphanumeric,
/// and so is both a valid DNS label and a valid container name.
pub fn route_key(owner: &str, name: &str, id: ProjectId) -> String {
    format!(
        "{}-{}-{}",
        sanitize(owner, OWNER_MAX_LEN, "user"),
        sanitize(name, NAME_MAX_LEN, "app"),
        id
    )
}

/// Routing options
#[derive(Debug, Clone)]
pub struct RoutingOptions {
    /// Public base domain apps are served under
    pub base_domain: String,

    /// URL scheme; derived from the base domain when unset
    pub scheme: Option<String>,

    /// Container network shared with the reverse proxy
    pub network: String,

    /// Port the app listens on inside its container
    pub container_port: u16,
}

impl Default for RoutingOptions {
    fn default() -> Self {
        Self {
            base_domain: "localhost".to_string(),
            scheme: None,
            network: "shipyard_apps".to_string(),
            container_port: 80,
        }
    }
}

/// A project's route and the metadata published for the reverse proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Routing key: container name and subdomain
    pub key: String,

    /// External host name
    pub host: String,

    /// External URL
    pub url: String,

    /// Container labels the reverse proxy discovers
    pub labels: BTreeMap<String, String>,
}

/// Assigns routes to projects
#[derive(Debug, Clone)]
pub struct RouteAssigner {
    options: RoutingOptions,
}

impl RouteAssigner {
    pub fn new(options: RoutingOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RoutingOptions {
        &self.options
    }

    fn scheme(&self) -> &str {
        match &self.options.scheme {
            Some(scheme) => scheme,
            None if self.options.base_domain == "localhost" => "http",
            None => "https",
        }
    }

    /// Assign the route for a project
    pub fn assign(&self, project: &Project) -> Route {
        let key = route_key(&project.owner, &project.name, project.id);
        let host = format!("{}.{}", key, self.options.base_domain);
        let url = format!("{}://{}", self.scheme(), host);

        let mut labels = BTreeMap::new();
        labels.insert(format!("{}.project_id", LABEL_PREFIX), project.id.to_string());
        labels.insert(format!("{}.owner", LABEL_PREFIX), project.owner.clone());
        labels.insert("traefik.enable".to_string(), "true".to_string());
        labels.insert(
            format!("traefik.http.routers.{}.rule", key),
            format!("Host(`{}`)", host),
        );
        labels.insert(
            format!("traefik.http.services.{}.loadbalancer.server.port", key),
            self.options.container_port.to_string(),
        );
        labels.insert(
            "traefik.docker.network".to_string(),
            self.options.network.clone(),
        );

        Route {
            key,
            host,
            url,
            labels,
        }
    }
}
