//! Ordered rewrite rules for the in-node admin kubeconfig.

use tracing::debug;

/// Port the API server listens on inside the node.
pub const NODE_API_PORT: u16 = 6443;

/// Host address the API server port is published on.
pub const HOST_LOOPBACK: &str = "127.0.0.1";

/// Cluster name kubeadm writes into `admin.conf`.
pub const DEFAULT_CLUSTER: &str = "kubernetes";

/// User name kubeadm writes into `admin.conf`.
pub const DEFAULT_USER: &str = "kubernetes-admin";

/// Context name kubeadm writes into `admin.conf`.
pub const DEFAULT_CONTEXT: &str = "kubernetes-admin@kubernetes";

/// User name in the patched document.
pub const ADMIN_USER: &str = "admin";

/// What a rule looks for on a single `key: value` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// `server: https://<any host>:<port>`.
    Server { port: u16 },

    /// `<key>: <token>`, where the token is followed by the end of the value
    /// or a character that cannot continue a name (so `kubernetes` matches
    /// the head of `kubernetes@x` but not of `kubernetes-admin`).
    Field {
        key: &'static str,
        token: &'static str,
    },
}

/// What a matched token is replaced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replacement {
    /// `https://127.0.0.1:<api port>`.
    HostApiServer,
    /// The cluster's external name.
    ClusterName,
    /// [`ADMIN_USER`].
    Admin,
}

/// A single rewrite rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub matcher: Matcher,
    pub replacement: Replacement,
}

impl Rule {
    const fn field(key: &'static str, token: &'static str, replacement: Replacement) -> Self {
        Self {
            matcher: Matcher::Field { key, token },
            replacement,
        }
    }
}

/// The rewrite rules, applied in order over the whole document.
///
/// The compound context name must be rewritten before the user name it
/// starts with, otherwise `name: kubernetes-admin@kubernetes` would become
/// `name: admin@kubernetes` and never match again.
pub const RULES: [Rule; 7] = [
    Rule {
        matcher: Matcher::Server {
            port: NODE_API_PORT,
        },
        replacement: Replacement::HostApiServer,
    },
    Rule::field("name", DEFAULT_CONTEXT, Replacement::ClusterName),
    Rule::field("name", DEFAULT_USER, Replacement::Admin),
    Rule::field("name", DEFAULT_CLUSTER, Replacement::ClusterName),
    Rule::field("cluster", DEFAULT_CLUSTER, Replacement::ClusterName),
    Rule::field("user", DEFAULT_USER, Replacement::Admin),
    Rule::field("current-context", DEFAULT_CONTEXT, Replacement::ClusterName),
];

/// Rewrite a raw in-node admin kubeconfig for use from the host.
pub fn patch(raw: &str, cluster_name: &str, api_port: u16) -> String {
    apply_rules(&RULES, raw, cluster_name, api_port)
}

/// Apply `rules` in order. Each rule sees the output of the previous one.
pub fn apply_rules(rules: &[Rule], raw: &str, cluster_name: &str, api_port: u16) -> String {
    let server = format!("https://{HOST_LOOPBACK}:{api_port}");

    rules.iter().fold(raw.to_string(), |text, rule| {
        let replacement = match rule.replacement {
            Replacement::HostApiServer => server.as_str(),
            Replacement::ClusterName => cluster_name,
            Replacement::Admin => ADMIN_USER,
        };
        apply_rule(&text, rule.matcher, replacement)
    })
}

fn apply_rule(text: &str, matcher: Matcher, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rewritten = 0usize;

    for raw_line in text.split_inclusive('\n') {
        let (line, ending) = split_line_ending(raw_line);
        match rewrite_line(line, matcher, replacement) {
            Some(new_line) => {
                rewritten += 1;
                out.push_str(&new_line);
            }
            None => out.push_str(line),
        }
        out.push_str(ending);
    }

    debug!(?matcher, lines = rewritten, "Applied kubeconfig rule");
    out
}

fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(stripped) = line.strip_suffix("\r\n") {
        (stripped, "\r\n")
    } else if let Some(stripped) = line.strip_suffix('\n') {
        (stripped, "\n")
    } else {
        (line, "")
    }
}

fn rewrite_line(line: &str, matcher: Matcher, replacement: &str) -> Option<String> {
    let key = match matcher {
        Matcher::Server { .. } => "server",
        Matcher::Field { key, .. } => key,
    };

    // Indentation and an optional list marker are carried over untouched.
    let trimmed = line.trim_start();
    let body = trimmed.strip_prefix("- ").unwrap_or(trimmed);
    let prefix = &line[..line.len() - body.len()];

    let rest = body.strip_prefix(key)?.strip_prefix(':')?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let value = rest.trim();

    let tail = match matcher {
        Matcher::Server { port } => {
            let host_port = value.strip_prefix("https://")?;
            let (host, found_port) = host_port.rsplit_once(':')?;
            if host.is_empty() || found_port.parse::<u16>().ok()? != port {
                return None;
            }
            ""
        }
        Matcher::Field { token, .. } => {
            let tail = value.strip_prefix(token)?;
            if tail.starts_with(is_name_char) {
                return None;
            }
            tail
        }
    };

    Some(format!("{prefix}{key}: {replacement}{tail}"))
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}
