/// Path rewriting for proxied requests: prefix stripping, secret
/// placeholder substitution, upstream URL assembly and log redaction.

/// Stands in for the server-held table collection id in client paths.
pub const SHEET_TOKEN_PLACEHOLDER: &str = "__SHEET_TOKEN__";

/// Upstream paths that issue credentials rather than consume them.
pub const AUTH_PATH_PREFIX: &str = "/open-apis/auth/";

/// Longest upstream excerpt echoed back when a body fails to parse.
pub const EXCERPT_LIMIT: usize = 200;

/// Returns what follows `prefix` in `path_and_query`, or `None` when
/// nothing does.
pub fn strip_prefix<'a>(path_and_query: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path_and_query.strip_prefix(prefix).unwrap_or(path_and_query);
    if rest.is_empty() || rest == "/" {
        None
    } else {
        Some(rest)
    }
}

pub fn has_placeholder(path: &str) -> bool {
    path.contains(SHEET_TOKEN_PLACEHOLDER)
}

pub fn substitute_placeholder(path: &str, sheet_token: &str) -> String {
    path.replace(SHEET_TOKEN_PLACEHOLDER, sheet_token)
}

pub fn rewrite_url(upstream_base: &str, path: &str) -> String {
    format!("{}{}", upstream_base.trim_end_matches('/'), path)
}

/// Masks every occurrence of `secret` in `line`.
pub fn redact(line: &str, secret: Option<&str>) -> String {
    match secret {
        Some(s) if !s.is_empty() => line.replace(s, "***"),
        _ => line.to_string(),
    }
}

pub fn is_auth_path(path: &str) -> bool {
    path.starts_with(AUTH_PATH_PREFIX)
}

/// First `EXCERPT_LIMIT` characters of `text`, cut on a char boundary.
pub fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_LIMIT).collect()
}
