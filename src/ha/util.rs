//! Small address/string helpers shared across the HA manager.
//!
//! Grounded in `original_source/include/utils.hpp` (`isIPv6`,
//! `parseHostPort`, `mergeHostPort`, `caseInsensitiveEqual`,
//! `versionString2Int32`) but reimplemented with `std::net` parsing
//! instead of raw `inet_pton` calls.

use std::net::IpAddr;

/// Splits `"host:port"` into its parts. IPv6 literals may be bracketed
/// (`"[::1]:3306"`) or bare with the last `:` segment taken as the port.
pub fn parse_host_port(addr: &str) -> Option<(String, u16)> {
    let addr = addr.trim();
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest.split_once(']')?;
        let port = rest.strip_prefix(':')?;
        return Some((host.to_string(), port.parse().ok()?));
    }
    let (host, port) = addr.rsplit_once(':')?;
    Some((host.to_string(), port.parse().ok()?))
}

/// Renders `(host, port)` back into the canonical `"host:port"` tag,
/// bracketing IPv6 hosts.
pub fn merge_host_port(host: &str, port: u16) -> String {
    if is_ipv6(host) {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// True when `host` parses as an IPv6 literal.
pub fn is_ipv6(host: &str) -> bool {
    matches!(host.parse::<IpAddr>(), Ok(IpAddr::V6(_)))
}

/// True when any address in a comma-separated address list is IPv6.
pub fn contains_ipv6(addr_list: &str) -> bool {
    addr_list
        .split(',')
        .filter_map(|a| parse_host_port(a.trim()))
        .any(|(host, _)| is_ipv6(&host))
}

pub fn case_insensitive_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Packs the leading `MAJOR.MINOR.PATCH` run of a `version()` string into
/// a comparable integer, as `10000*MAJOR + 100*MINOR + PATCH`.
///
/// Grounded in `versionString2Int32`; unlike the original this returns
/// `None` rather than 0 when no numeric run is present, since 0 is a
/// legitimate packed version (`0.0.0`).
pub fn version_string_to_i32(version: &str) -> Option<i32> {
    let numeric: String = version
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts = numeric.split('.');
    let major: i32 = parts.next()?.parse().ok()?;
    let minor: i32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let patch: i32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    Some(10000 * major + 100 * minor + patch)
}

/// Strips a leading `tcp://`/`mysql://`-style scheme, if present.
pub fn strip_protocol(addr: &str) -> &str {
    addr.split_once("://").map(|(_, rest)| rest).unwrap_or(addr)
}

/// Splits a comma-joined address list into trimmed, non-empty entries.
pub fn split_addr_list(addr: &str) -> Vec<String> {
    addr.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(strip_protocol)
        .map(str::to_string)
        .collect()
}

/// Derives the cluster tag used to key the process-wide registry (§3.2
/// invariant 5): `str(cluster_id)` when known, otherwise `addr + "#"`.
pub fn cluster_tag(cluster_id: i64, addr: &str) -> String {
    if cluster_id >= 0 {
        cluster_id.to_string()
    } else {
        format!("{addr}#")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ipv4_host_port() {
        assert_eq!(
            parse_host_port("10.0.0.1:3306"),
            Some(("10.0.0.1".to_string(), 3306))
        );
    }

    #[test]
    fn parses_bracketed_ipv6_host_port() {
        assert_eq!(parse_host_port("[::1]:3306"), Some(("::1".to_string(), 3306)));
    }

    #[test]
    fn detects_ipv6() {
        assert!(is_ipv6("::1"));
        assert!(!is_ipv6("10.0.0.1"));
        assert!(!is_ipv6("not-an-ip"));
    }

    #[test]
    fn merges_back_bracketed() {
        assert_eq!(merge_host_port("::1", 3306), "[::1]:3306");
        assert_eq!(merge_host_port("10.0.0.1", 3306), "10.0.0.1:3306");
    }

    #[test]
    fn packs_version_string() {
        assert_eq!(version_string_to_i32("8.0.27-TDDL-5.4.15"), Some(80027));
        assert_eq!(version_string_to_i32("5.7"), Some(50700));
    }

    #[test]
    fn tag_prefers_cluster_id() {
        assert_eq!(cluster_tag(42, "a:1,b:2"), "42");
        assert_eq!(cluster_tag(-1, "a:1,b:2"), "a:1,b:2#");
    }

    #[test]
    fn splits_addr_list_and_strips_protocol() {
        assert_eq!(
            split_addr_list(" tcp://10.0.0.1:3306 , 10.0.0.2:3306 ,, "),
            vec!["10.0.0.1:3306".to_string(), "10.0.0.2:3306".to_string()]
        );
    }
}
