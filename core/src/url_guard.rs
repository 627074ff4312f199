//! URL safety validation against server-side request forgery.
//!
//! # Design
//! The decision is made on resolved addresses, not on the host name: a name
//! can resolve to anything, so every URL is resolved before it is classified.
//! Resolution failure blocks the URL. Verdicts are computed fresh for every
//! URL and every redirect hop and are never cached.
//!
//! The resolver is a trait so tests (and offline deployments) can pin host
//! names to fixed addresses.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::debug;
use url::{Host, Url};

/// Exact-match cloud metadata endpoints (AWS/Azure/GCP and AWS IMDSv2 IPv6).
const METADATA_ADDRS: [IpAddr; 2] = [
    IpAddr::V4(Ipv4Addr::new(169, 254, 169, 254)),
    IpAddr::V6(Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x0254)),
];

/// Policy flags consulted by the validator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlPolicy {
    pub allow_localhost: bool,
    pub allow_private_ips: bool,
}

/// Address class that caused a URL to be blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockedRange {
    CloudMetadata,
    Loopback,
    LinkLocal,
    Private,
    UniqueLocal,
    SharedAddressSpace,
    Unspecified,
}

impl fmt::Display for BlockedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockedRange::CloudMetadata => "cloud metadata",
            BlockedRange::Loopback => "loopback",
            BlockedRange::LinkLocal => "link-local",
            BlockedRange::Private => "private",
            BlockedRange::UniqueLocal => "unique local",
            BlockedRange::SharedAddressSpace => "shared address space",
            BlockedRange::Unspecified => "unspecified",
        };
        f.write_str(name)
    }
}

/// Outcome of validating one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyVerdict {
    Allowed,
    BlockedScheme(String),
    BlockedHost(String),
    BlockedIp { addr: IpAddr, range: BlockedRange },
    ResolutionFailed(String),
}

impl SafetyVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, SafetyVerdict::Allowed)
    }
}

impl fmt::Display for SafetyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyVerdict::Allowed => write!(f, "allowed"),
            SafetyVerdict::BlockedScheme(scheme) => {
                write!(f, "unsupported URL scheme: {scheme}")
            }
            SafetyVerdict::BlockedHost(host) => {
                write!(f, "requests to localhost are not allowed: {host}")
            }
            SafetyVerdict::BlockedIp { addr, range } => {
                write!(f, "requests to {range} addresses are not allowed: {addr}")
            }
            SafetyVerdict::ResolutionFailed(reason) => write!(f, "{reason}"),
        }
    }
}

/// Name resolution did not finish before the caller's deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineExceeded;

/// Host name to address resolution.
pub trait Resolver: Send + Sync {
    fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolves through the platform resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        Ok((host, 0).to_socket_addrs()?.map(|a| a.ip()).collect())
    }
}

/// Resolves from a fixed host table; unknown names fail.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: &str, addrs: &[IpAddr]) -> Self {
        self.hosts.insert(host.to_ascii_lowercase(), addrs.to_vec());
        self
    }
}

impl Resolver for StaticResolver {
    fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        self.hosts
            .get(&host.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such host"))
    }
}

/// Validator binding a policy to a resolver.
#[derive(Clone)]
pub struct UrlGuard {
    policy: UrlPolicy,
    resolver: Arc<dyn Resolver>,
}

impl fmt::Debug for UrlGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlGuard").field("policy", &self.policy).finish_non_exhaustive()
    }
}

impl UrlGuard {
    pub fn new(policy: UrlPolicy, resolver: Arc<dyn Resolver>) -> Self {
        Self { policy, resolver }
    }

    pub fn system(policy: UrlPolicy) -> Self {
        Self::new(policy, Arc::new(SystemResolver))
    }

    pub fn policy(&self) -> UrlPolicy {
        self.policy
    }

    pub fn validate(&self, raw: &str) -> SafetyVerdict {
        match Url::parse(raw) {
            Ok(url) => self.validate_url(&url),
            Err(e) => SafetyVerdict::ResolutionFailed(format!("invalid URL: {e}")),
        }
    }

    pub fn validate_url(&self, url: &Url) -> SafetyVerdict {
        match self.evaluate(url, |name| Ok::<_, Infallible>(self.resolver.resolve(name))) {
            Ok(verdict) => verdict,
            Err(never) => match never {},
        }
    }

    /// `validate_url`, giving up on name resolution at `deadline`.
    ///
    /// The lookup runs on a helper thread. A lookup still pending at the
    /// deadline is abandoned and finishes in the background.
    pub fn validate_url_until(
        &self,
        url: &Url,
        deadline: Instant,
    ) -> Result<SafetyVerdict, DeadlineExceeded> {
        self.evaluate(url, |name| self.resolve_until(name, deadline))
    }

    fn resolve_until(
        &self,
        name: &str,
        deadline: Instant,
    ) -> Result<io::Result<Vec<IpAddr>>, DeadlineExceeded> {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .filter(|d| !d.is_zero())
            .ok_or(DeadlineExceeded)?;

        let (tx, rx) = mpsc::sync_channel(1);
        let resolver = Arc::clone(&self.resolver);
        let host = name.to_string();
        let spawned = thread::Builder::new()
            .name("courier-resolve".to_string())
            .spawn(move || {
                let _ = tx.send(resolver.resolve(&host));
            });
        if let Err(e) = spawned {
            return Ok(Err(e));
        }

        match rx.recv_timeout(remaining) {
            Ok(result) => Ok(result),
            Err(RecvTimeoutError::Timeout) => {
                debug!(host = %name, ?remaining, "resolution outlived the deadline");
                Err(DeadlineExceeded)
            }
            Err(RecvTimeoutError::Disconnected) => Ok(Err(io::Error::other("resolver exited without an answer"))),
        }
    }

    fn evaluate<E>(
        &self,
        url: &Url,
        resolve: impl FnOnce(&str) -> Result<io::Result<Vec<IpAddr>>, E>,
    ) -> Result<SafetyVerdict, E> {
        let scheme = url.scheme();
        if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
            return Ok(SafetyVerdict::BlockedScheme(scheme.to_string()));
        }

        let (name, literal) = match url.host() {
            Some(Host::Domain(d)) => (d.to_ascii_lowercase(), None),
            Some(Host::Ipv4(a)) => (a.to_string(), Some(IpAddr::V4(a))),
            Some(Host::Ipv6(a)) => (a.to_string(), Some(IpAddr::V6(a))),
            None => return Ok(SafetyVerdict::ResolutionFailed("URL must contain a hostname".into())),
        };
        if name.is_empty() {
            return Ok(SafetyVerdict::ResolutionFailed("URL must contain a hostname".into()));
        }

        if !self.policy.allow_localhost && is_localhost_alias(&name) {
            return Ok(SafetyVerdict::BlockedHost(name));
        }

        let addrs = match literal {
            Some(addr) => vec![addr],
            None => match resolve(&name)? {
                Ok(addrs) if !addrs.is_empty() => addrs,
                Ok(_) => {
                    return Ok(SafetyVerdict::ResolutionFailed(format!(
                        "failed to resolve hostname {name}: no addresses"
                    )))
                }
                Err(e) => {
                    return Ok(SafetyVerdict::ResolutionFailed(format!(
                        "failed to resolve hostname {name}: {e}"
                    )))
                }
            },
        };
        debug!(host = %name, addrs = ?addrs, "resolved target");

        if !self.policy.allow_private_ips {
            if let Some((addr, range)) = addrs.iter().find_map(|a| classify(*a).map(|r| (*a, r))) {
                return Ok(SafetyVerdict::BlockedIp { addr, range });
            }
        }

        Ok(SafetyVerdict::Allowed)
    }
}

/// Textual loopback aliases, checked before resolution.
fn is_localhost_alias(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host == "localhost"
        || host.ends_with(".localhost")
        || host == "::1"
        || host == "::"
        || host == "0.0.0.0"
        || host.starts_with("127.")
}

/// Blocked class of `addr`, or `None` for a publicly routable address.
pub fn classify(addr: IpAddr) -> Option<BlockedRange> {
    if METADATA_ADDRS.contains(&addr) {
        return Some(BlockedRange::CloudMetadata);
    }
    match addr {
        IpAddr::V4(v4) => classify_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => classify(IpAddr::V4(v4)),
            None => classify_v6(v6),
        },
    }
}

fn classify_v4(ip: Ipv4Addr) -> Option<BlockedRange> {
    let octets = ip.octets();
    if ip.is_loopback() {
        Some(BlockedRange::Loopback)
    } else if ip.is_link_local() || (octets[0] == 224 && octets[1] == 0 && octets[2] == 0) {
        // 169.254.0.0/16 and link-local multicast 224.0.0.0/24
        Some(BlockedRange::LinkLocal)
    } else if ip.is_private() {
        Some(BlockedRange::Private)
    } else if octets[0] == 100 && (octets[1] & 0xc0) == 64 {
        // 100.64.0.0/10
        Some(BlockedRange::SharedAddressSpace)
    } else if octets[0] == 0 {
        Some(BlockedRange::Unspecified)
    } else {
        None
    }
}

fn classify_v6(ip: Ipv6Addr) -> Option<BlockedRange> {
    let first = ip.segments()[0];
    if ip.is_loopback() {
        Some(BlockedRange::Loopback)
    } else if ip.is_unspecified() {
        Some(BlockedRange::Unspecified)
    } else if first & 0xffc0 == 0xfe80 || first & 0xff0f == 0xff02 {
        // fe80::/10 and link-local multicast ff02::/16
        Some(BlockedRange::LinkLocal)
    } else if first & 0xfe00 == 0xfc00 {
        Some(BlockedRange::UniqueLocal)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBLIC: IpAddr = IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34));

    fn resolver() -> StaticResolver {
        StaticResolver::new()
            .with_host("api.example.com", &[PUBLIC])
            .with_host("internal.corp", &["10.1.2.3".parse().unwrap()])
            .with_host("mixed.example.com", &[PUBLIC, "192.168.1.10".parse().unwrap()])
            .with_host("metadata.example.com", &["169.254.169.254".parse().unwrap()])
            .with_host("localhost", &["127.0.0.1".parse().unwrap()])
    }

    fn guard(allow_localhost: bool, allow_private_ips: bool) -> UrlGuard {
        UrlGuard::new(
            UrlPolicy { allow_localhost, allow_private_ips },
            Arc::new(resolver()),
        )
    }

    fn strict() -> UrlGuard {
        guard(false, false)
    }

    #[test]
    fn public_host_is_allowed() {
        assert_eq!(strict().validate("https://api.example.com/v1/users"), SafetyVerdict::Allowed);
        assert_eq!(strict().validate("http://93.184.216.34:8080/"), SafetyVerdict::Allowed);
    }

    #[test]
    fn non_http_schemes_are_blocked_regardless_of_flags() {
        for flags in [(false, false), (true, true)] {
            let g = guard(flags.0, flags.1);
            for url in ["file:///etc/passwd", "ftp://api.example.com/", "ws://api.example.com/", "gopher://x/"] {
                assert!(
                    matches!(g.validate(url), SafetyVerdict::BlockedScheme(_)),
                    "{url} with {flags:?}"
                );
            }
        }
    }

    #[test]
    fn scheme_comparison_ignores_case() {
        assert_eq!(strict().validate("HTTPS://api.example.com/"), SafetyVerdict::Allowed);
    }

    #[test]
    fn malformed_url_fails_resolution() {
        assert!(matches!(strict().validate("not a url"), SafetyVerdict::ResolutionFailed(_)));
        assert!(matches!(strict().validate("http://"), SafetyVerdict::ResolutionFailed(_)));
    }

    #[test]
    fn localhost_aliases_are_blocked_by_host() {
        for url in [
            "http://localhost/",
            "http://LOCALHOST:3000/",
            "http://app.localhost/",
            "http://127.0.0.1/",
            "http://127.8.9.10/",
            "http://0.0.0.0/",
            "http://[::1]/",
            "http://[::]/",
        ] {
            assert!(
                matches!(strict().validate(url), SafetyVerdict::BlockedHost(_)),
                "{url}"
            );
        }
    }

    #[test]
    fn allowing_localhost_still_blocks_loopback_addresses() {
        let verdict = guard(true, false).validate("http://localhost:8080/");
        assert_eq!(
            verdict,
            SafetyVerdict::BlockedIp {
                addr: "127.0.0.1".parse().unwrap(),
                range: BlockedRange::Loopback
            }
        );
    }

    #[test]
    fn allowing_both_admits_loopback() {
        assert_eq!(guard(true, true).validate("http://localhost:8080/"), SafetyVerdict::Allowed);
        assert_eq!(guard(true, true).validate("http://127.0.0.1:8080/"), SafetyVerdict::Allowed);
    }

    #[test]
    fn private_ranges_are_blocked() {
        let cases = [
            ("http://10.0.0.1/", BlockedRange::Private),
            ("http://172.16.0.1/", BlockedRange::Private),
            ("http://172.31.255.255/", BlockedRange::Private),
            ("http://192.168.0.1/", BlockedRange::Private),
            ("http://169.254.1.1/", BlockedRange::LinkLocal),
            ("http://100.64.0.1/", BlockedRange::SharedAddressSpace),
            ("http://100.127.255.254/", BlockedRange::SharedAddressSpace),
            ("http://[fc00::1]/", BlockedRange::UniqueLocal),
            ("http://[fd12:3456::1]/", BlockedRange::UniqueLocal),
            ("http://[fe80::1]/", BlockedRange::LinkLocal),
            ("http://[::ffff:10.0.0.1]/", BlockedRange::Private),
        ];
        // localhost allowed so the textual check does not short-circuit
        let g = guard(true, false);
        for (url, expected) in cases {
            match g.validate(url) {
                SafetyVerdict::BlockedIp { range, .. } => assert_eq!(range, expected, "{url}"),
                other => panic!("{url}: expected BlockedIp, got {other:?}"),
            }
        }
    }

    #[test]
    fn ranges_just_outside_private_blocks_are_allowed() {
        let g = guard(false, false);
        for url in ["http://172.32.0.1/", "http://100.128.0.1/", "http://11.0.0.1/", "http://[2001:db8::1]/"] {
            assert_eq!(g.validate(url), SafetyVerdict::Allowed, "{url}");
        }
    }

    #[test]
    fn metadata_endpoint_is_blocked_independent_of_localhost_flag() {
        for allow_localhost in [false, true] {
            let verdict = guard(allow_localhost, false)
                .validate("http://169.254.169.254/latest/meta-data");
            assert_eq!(
                verdict,
                SafetyVerdict::BlockedIp {
                    addr: "169.254.169.254".parse().unwrap(),
                    range: BlockedRange::CloudMetadata
                }
            );
        }
        assert!(matches!(
            strict().validate("http://[fd00:ec2::254]/"),
            SafetyVerdict::BlockedIp { range: BlockedRange::CloudMetadata, .. }
        ));
    }

    #[test]
    fn hostname_resolving_to_private_address_is_blocked() {
        let verdict = strict().validate("https://internal.corp/admin");
        assert!(matches!(verdict, SafetyVerdict::BlockedIp { range: BlockedRange::Private, .. }));

        let verdict = strict().validate("https://metadata.example.com/");
        assert!(matches!(verdict, SafetyVerdict::BlockedIp { range: BlockedRange::CloudMetadata, .. }));
    }

    #[test]
    fn any_private_address_in_the_set_blocks() {
        let verdict = strict().validate("https://mixed.example.com/");
        assert_eq!(
            verdict,
            SafetyVerdict::BlockedIp {
                addr: "192.168.1.10".parse().unwrap(),
                range: BlockedRange::Private
            }
        );
    }

    #[test]
    fn resolution_failure_is_fail_closed() {
        let verdict = guard(true, true).validate("https://unknown.invalid/");
        assert!(matches!(verdict, SafetyVerdict::ResolutionFailed(_)));
    }

    #[test]
    fn verdict_messages_carry_the_reason() {
        let verdict = strict().validate("http://169.254.169.254/");
        let msg = verdict.to_string();
        assert!(msg.contains("cloud metadata"), "{msg}");
        assert!(msg.contains("169.254.169.254"), "{msg}");
        assert!(strict().validate("ftp://x/").to_string().contains("ftp"));
    }

    #[test]
    fn classify_public_addresses() {
        assert_eq!(classify(PUBLIC), None);
        assert_eq!(classify("8.8.8.8".parse().unwrap()), None);
        assert_eq!(classify("2606:4700::1111".parse().unwrap()), None);
        assert_eq!(classify("0.0.0.0".parse().unwrap()), Some(BlockedRange::Unspecified));
        assert_eq!(classify("224.0.0.251".parse().unwrap()), Some(BlockedRange::LinkLocal));
        assert_eq!(classify("ff02::1".parse().unwrap()), Some(BlockedRange::LinkLocal));
    }

    struct Stalled;

    impl Resolver for Stalled {
        fn resolve(&self, _host: &str) -> io::Result<Vec<IpAddr>> {
            thread::sleep(std::time::Duration::from_millis(1500));
            Ok(vec![PUBLIC])
        }
    }

    #[test]
    fn resolution_past_the_deadline_is_abandoned() {
        use std::time::Duration;

        let guard = UrlGuard::new(UrlPolicy::default(), Arc::new(Stalled));
        let url = Url::parse("https://stalled.example.com/").unwrap();
        let started = Instant::now();
        let outcome = guard.validate_url_until(&url, started + Duration::from_millis(100));
        assert_eq!(outcome, Err(DeadlineExceeded));
        assert!(started.elapsed() < Duration::from_secs(1));

        // Literals never reach the resolver, so they finish in time.
        let literal = Url::parse("https://93.184.216.34/").unwrap();
        let outcome = guard.validate_url_until(&literal, Instant::now() + Duration::from_millis(100));
        assert_eq!(outcome, Ok(SafetyVerdict::Allowed));
    }

    #[test]
    fn spent_deadline_fails_before_resolving() {
        let url = Url::parse("https://api.example.com/").unwrap();
        let outcome = strict().validate_url_until(&url, Instant::now());
        assert_eq!(outcome, Err(DeadlineExceeded));
        assert_eq!(
            strict().validate_url_until(&url, Instant::now() + std::time::Duration::from_secs(5)),
            Ok(SafetyVerdict::Allowed)
        );
    }
}
