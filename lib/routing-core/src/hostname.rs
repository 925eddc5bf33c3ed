//! Hostname normalization
//!
//! Every structure keyed by hostname (the service cache's hostname index, the
//! gateway's fallback cache, the routing engine's input) goes through
//! [`normalize_hostname`] so that keys never diverge.

/// Normalize a routable hostname: lowercase, drop the `http://`/`https://`
/// scheme, anything from the first `/` on, and a trailing `:port`.
///
/// Returns `None` when nothing is left.
pub fn normalize_hostname(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_ascii_lowercase();

    let without_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);

    let host = without_scheme
        .split_once('/')
        .map(|(host, _)| host)
        .unwrap_or(without_scheme);

    let host = match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        Some((name, "")) => name,
        _ => host,
    };

    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_plain() {
        assert_eq!(normalize_hostname("demo.example.com").as_deref(), Some("demo.example.com"));
    }

    #[test]
    fn test_normalize_scheme_port_slash_case() {
        assert_eq!(
            normalize_hostname("HTTP://Demo.Example.com:8080/").as_deref(),
            Some("demo.example.com")
        );
        assert_eq!(
            normalize_hostname("https://demo.example.com/").as_deref(),
            Some("demo.example.com")
        );
    }

    #[test]
    fn test_normalize_drops_path() {
        assert_eq!(
            normalize_hostname("https://demo.example.com/some/path").as_deref(),
            Some("demo.example.com")
        );
    }

    #[test]
    fn test_normalize_trims_whitespace() {
        assert_eq!(normalize_hostname("  x.com  ").as_deref(), Some("x.com"));
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize_hostname(""), None);
        assert_eq!(normalize_hostname("   "), None);
        assert_eq!(normalize_hostname("https://"), None);
        assert_eq!(normalize_hostname("http:///"), None);
    }
}
