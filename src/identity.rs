use actix_web::dev::ServiceRequest;
use actix_web::http::header::HeaderName;
use once_cell::sync::Lazy;
use std::future::{ready, Ready};
use std::net::{AddrParseError, IpAddr, Ipv6Addr, SocketAddr};
use thiserror::Error;

pub static X_USER_ID: Lazy<HeaderName> = Lazy::new(|| HeaderName::from_static("x-user-id"));

pub static X_REQUEST_TYPE: Lazy<HeaderName> =
    Lazy::new(|| HeaderName::from_static("x-request-type"));

pub type IdentityFuture = Ready<Result<RequestIdentity, actix_web::Error>>;

/// The three strings the [QuotaEngine](crate::QuotaEngine) needs to decide on a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestIdentity {
    /// Subject of the request rate quota. May be empty.
    pub source_address: String,
    /// Subject of the message rate and failed transaction quotas. May be empty.
    pub principal_id: String,
    /// Request category label, `"message"`, `"transaction"` or anything else.
    pub category: String,
}

/// Utility to create an identity function for a [QuotaGate](crate::QuotaGate).
///
/// By default the source address is the connection peer IP, the principal is read from the
/// `X-User-ID` header and the category from the `X-Request-Type` header. Missing headers are
/// treated as empty strings (an anonymous principal, no category).
///
/// The produced function never fails: an address that cannot be parsed as an IP is used
/// verbatim, and a missing address becomes the empty (anonymous) source.
///
/// If you need to resolve identities asynchronously (e.g. from a session store) you should
/// instead write your own identity function.
pub struct IdentityFunctionBuilder {
    real_ip_key: bool,
    group_ipv6_subnets: bool,
    principal_header: HeaderName,
    category_header: HeaderName,
}

impl IdentityFunctionBuilder {
    pub fn new() -> Self {
        Self {
            real_ip_key: false,
            group_ipv6_subnets: false,
            principal_header: X_USER_ID.clone(),
            category_header: X_REQUEST_TYPE.clone(),
        }
    }

    /// Use the client's real IP as the source address, instead of the connection peer.
    ///
    /// # Security
    ///
    /// This calls
    /// [ConnectionInfo::realip_remote_addr()](actix_web::dev::ConnectionInfo::realip_remote_addr)
    /// internally which is only suitable for Actix applications deployed behind a proxy that you
    /// control.
    pub fn real_ip_key(mut self) -> Self {
        self.real_ip_key = true;
        self
    }

    /// Share one source address per IPv6 /64 subnet, rather than one per address.
    ///
    /// A single client usually controls a whole /64, see
    /// <https://adam-p.ca/blog/2022/02/ipv6-rate-limiting/>
    pub fn group_ipv6_subnets(mut self) -> Self {
        self.group_ipv6_subnets = true;
        self
    }

    /// Read the principal identifier from a different header.
    pub fn principal_header(mut self, name: HeaderName) -> Self {
        self.principal_header = name;
        self
    }

    /// Read the request category from a different header.
    pub fn category_header(mut self, name: HeaderName) -> Self {
        self.category_header = name;
        self
    }

    pub fn build(self) -> impl Fn(&ServiceRequest) -> IdentityFuture + 'static {
        move |req| ready(Ok(self.identify(req)))
    }

    fn identify(&self, req: &ServiceRequest) -> RequestIdentity {
        let source_address = if self.real_ip_key {
            let info = req.connection_info();
            info.realip_remote_addr()
                .map(|addr| self.source_key(addr))
                .unwrap_or_default()
        } else {
            req.peer_addr()
                .map(|peer| self.ip_key(peer.ip()))
                .unwrap_or_default()
        };
        if source_address.is_empty() {
            log::debug!("No remote address for {}, using the anonymous source", req.path());
        }
        let header = |name: &HeaderName| {
            req.headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_owned()
        };
        RequestIdentity {
            source_address,
            principal_id: header(&self.principal_header),
            category: header(&self.category_header),
        }
    }

    fn source_key(&self, addr: &str) -> String {
        match parse_ip(addr) {
            Ok(ip) => self.ip_key(ip),
            Err(e) => {
                log::debug!("{e}, using it verbatim");
                addr.to_owned()
            }
        }
    }

    fn ip_key(&self, ip: IpAddr) -> String {
        match ip {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => {
                if let Some(v4) = v6.to_ipv4_mapped() {
                    return v4.to_string();
                }
                if !self.group_ipv6_subnets {
                    return v6.to_string();
                }
                let s = v6.segments();
                let subnet = Ipv6Addr::new(s[0], s[1], s[2], s[3], 0, 0, 0, 0);
                format!("{}/64", subnet)
            }
        }
    }
}

impl Default for IdentityFunctionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
#[error("Unable to parse remote IP address {address:?}: {source}")]
struct Error {
    address: String,
    #[source]
    source: AddrParseError,
}

// Accepts a bare IP or an `ip:port` socket address, as found in forwarding headers.
fn parse_ip(addr: &str) -> Result<IpAddr, Error> {
    match addr.parse::<IpAddr>() {
        Ok(ip) => Ok(ip),
        Err(source) => match addr.parse::<SocketAddr>() {
            Ok(socket) => Ok(socket.ip()),
            Err(_) => Err(Error {
                address: addr.to_owned(),
                source,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{QuotaEngine, QuotaGate};
    use actix_web::test::TestRequest;
    use actix_web::App;

    fn peer(builder: IdentityFunctionBuilder, addr: &str) -> RequestIdentity {
        let req = TestRequest::default()
            .peer_addr(addr.parse().unwrap())
            .to_srv_request();
        builder.identify(&req)
    }

    #[test]
    fn test_ip_key() {
        let builder = IdentityFunctionBuilder::new();
        let key = |addr: &str| builder.source_key(addr);
        // Check that IPv4 addresses are preserved
        assert_eq!(key("142.250.187.206"), "142.250.187.206");
        // Check that IPv4 mapped addresses are unwrapped
        assert_eq!(key("::FFFF:142.250.187.206"), "142.250.187.206");
        // Check that IPv6 addresses are kept whole
        assert_eq!(key("2a00:1450:4009:81f::200e"), "2a00:1450:4009:81f::200e");
        // Ports are dropped
        assert_eq!(key("10.1.2.3:8080"), "10.1.2.3");
        assert_eq!(
            key("[2a00:1450:4009:81f::200e]:443"),
            "2a00:1450:4009:81f::200e"
        );
        // Anything else is used verbatim
        assert_eq!(key("not-an-ip"), "not-an-ip");
    }

    #[test]
    fn test_ip_key_grouped_subnets() {
        let builder = IdentityFunctionBuilder::new().group_ipv6_subnets();
        assert_eq!(
            builder.source_key("2a00:1450:4009:81f::200e"),
            "2a00:1450:4009:81f::/64"
        );
        // IPv4 is unaffected by grouping
        assert_eq!(builder.source_key("::FFFF:10.0.0.1"), "10.0.0.1");
    }

    #[actix_web::test]
    async fn test_distinct_ipv6_peers() {
        let a = peer(IdentityFunctionBuilder::new(), "[2001:db8:1:2::a]:5000");
        let b = peer(IdentityFunctionBuilder::new(), "[2001:db8:1:2::b]:5000");
        assert_eq!(a.source_address, "2001:db8:1:2::a");
        assert_eq!(b.source_address, "2001:db8:1:2::b");

        let grouped = || IdentityFunctionBuilder::new().group_ipv6_subnets();
        let a = peer(grouped(), "[2001:db8:1:2::a]:5000");
        let b = peer(grouped(), "[2001:db8:1:2::b]:5000");
        assert_eq!(a.source_address, "2001:db8:1:2::/64");
        assert_eq!(a.source_address, b.source_address);
    }

    #[actix_web::test]
    async fn test_default_headers() {
        let identify = IdentityFunctionBuilder::new().build();
        let req = TestRequest::default()
            .peer_addr("192.168.1.1:5000".parse().unwrap())
            .insert_header(("X-User-ID", "user1"))
            .insert_header(("X-Request-Type", "message"))
            .to_srv_request();
        let identity = identify(&req).await.unwrap();
        assert_eq!(
            identity,
            RequestIdentity {
                source_address: "192.168.1.1".to_string(),
                principal_id: "user1".to_string(),
                category: "message".to_string(),
            }
        );
    }

    #[actix_web::test]
    async fn test_missing_headers_are_empty() {
        let identity = peer(IdentityFunctionBuilder::new(), "192.168.1.5:5000");
        assert_eq!(identity.source_address, "192.168.1.5");
        assert_eq!(identity.principal_id, "");
        assert_eq!(identity.category, "");
    }

    #[actix_web::test]
    async fn test_custom_headers() {
        let identify = IdentityFunctionBuilder::new()
            .principal_header(HeaderName::from_static("x-account"))
            .category_header(HeaderName::from_static("x-kind"))
            .build();
        let req = TestRequest::default()
            .peer_addr("10.0.0.1:5000".parse().unwrap())
            .insert_header(("X-User-ID", "ignored"))
            .insert_header(("X-Account", "acct-9"))
            .insert_header(("X-Kind", "transaction"))
            .to_srv_request();
        let identity = identify(&req).await.unwrap();
        assert_eq!(identity.principal_id, "acct-9");
        assert_eq!(identity.category, "transaction");
    }

    #[actix_web::test]
    async fn test_real_ip() {
        let identify = IdentityFunctionBuilder::new().real_ip_key().build();
        let req = TestRequest::default()
            .peer_addr("10.0.0.1:5000".parse().unwrap())
            .insert_header(("X-Forwarded-For", "203.0.113.7"))
            .to_srv_request();
        let identity = identify(&req).await.unwrap();
        assert_eq!(identity.source_address, "203.0.113.7");
    }

    #[actix_web::test]
    async fn test_unparseable_real_ip_is_verbatim() {
        let identify = IdentityFunctionBuilder::new().real_ip_key().build();
        let req = TestRequest::default()
            .peer_addr("10.0.0.1:5000".parse().unwrap())
            .insert_header(("X-Forwarded-For", "unknown"))
            .to_srv_request();
        let identity = identify(&req).await.unwrap();
        assert_eq!(identity.source_address, "unknown");
    }

    #[actix_web::test]
    async fn test_missing_peer_address_is_anonymous() {
        let identify = IdentityFunctionBuilder::new().build();
        let req = TestRequest::default().to_srv_request();
        let identity = identify(&req).await.unwrap();
        assert_eq!(identity.source_address, "");
    }

    #[actix_web::test]
    async fn test_use_with_middleware() {
        // Check that all the type signatures work together
        let identify = IdentityFunctionBuilder::new().build();
        let gate = QuotaGate::builder(QuotaEngine::new(), identify).build();
        actix_web::test::init_service(App::new().wrap(gate)).await;
    }
}
