//! Proxy descriptors that survive a process boundary.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::http::{parse_authority, HttpResourceProxy};
use super::transport::{HttpTransport, ReqwestTransport};
use super::types::{FetchError, ProxyFactory, ResourceProxy};
use crate::clock::Clock;
use crate::codec::{self, CodecError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyMethod {
    Http,
    Https,
}

impl ProxyMethod {
    pub const fn wire(self) -> i32 {
        match self {
            ProxyMethod::Http => 0x1,
            ProxyMethod::Https => 0x2,
        }
    }

    pub fn from_wire(value: i32) -> Result<Self, CodecError> {
        match value {
            0x1 => Ok(ProxyMethod::Http),
            0x2 => Ok(ProxyMethod::Https),
            other => Err(CodecError::UnknownValue {
                kind: "proxy method",
                value: other as i64,
            }),
        }
    }

    pub const fn scheme(self) -> &'static str {
        match self {
            ProxyMethod::Http => "http",
            ProxyMethod::Https => "https",
        }
    }
}

impl fmt::Display for ProxyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Method plus marshalled authority.
///
/// `extra` is the authority URL as a length-prefixed UTF-16 string, the
/// same layout as the URI field of a cache info header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySpec {
    method: ProxyMethod,
    extra: Vec<u8>,
}

impl ProxySpec {
    pub fn new(method: ProxyMethod, authority: &str) -> Result<Self, FetchError> {
        let url = parse_authority(authority, method.scheme())?;
        let mut extra = Vec::new();
        codec::put_utf16(&mut extra, url.as_str());
        Ok(Self { method, extra })
    }

    pub fn http(authority: &str) -> Result<Self, FetchError> {
        Self::new(ProxyMethod::Http, authority)
    }

    pub fn https(authority: &str) -> Result<Self, FetchError> {
        Self::new(ProxyMethod::Https, authority)
    }

    /// Rebuild a descriptor received as `(method, extra)`.
    pub fn from_parts(method: i32, extra: &[u8]) -> Result<Self, FetchError> {
        let method = ProxyMethod::from_wire(method)?;
        let mut buf = extra;
        // Trailing padding after the string is ignored.
        let authority = codec::get_utf16(&mut buf)?;
        Self::new(method, &authority)
    }

    pub fn method(&self) -> ProxyMethod {
        self.method
    }

    pub fn extra(&self) -> &[u8] {
        &self.extra
    }

    pub fn authority(&self) -> Result<String, FetchError> {
        let mut buf = self.extra.as_slice();
        Ok(codec::get_utf16(&mut buf)?)
    }

    /// Factory backed by a reqwest transport with the given timeout.
    pub fn factory(
        &self,
        timeout_secs: u64,
        clock: Arc<dyn Clock>,
    ) -> Result<HttpProxyFactory, FetchError> {
        let transport = Arc::new(ReqwestTransport::with_timeout(timeout_secs)?);
        Ok(HttpProxyFactory::new(self.clone(), transport, clock))
    }
}

impl fmt::Display for ProxySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.authority() {
            Ok(authority) => f.write_str(&authority),
            Err(_) => write!(f, "{}:<corrupt>", self.method),
        }
    }
}

/// Picks the method from the URL scheme.
impl FromStr for ProxySpec {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.get(..8).is_some_and(|p| p.eq_ignore_ascii_case("https://")) {
            Self::https(s)
        } else {
            Self::http(s)
        }
    }
}

/// Creates HTTP(S) proxies sharing one transport.
pub struct HttpProxyFactory {
    spec: ProxySpec,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
}

impl HttpProxyFactory {
    pub fn new(spec: ProxySpec, transport: Arc<dyn HttpTransport>, clock: Arc<dyn Clock>) -> Self {
        Self {
            spec,
            transport,
            clock,
        }
    }

    pub fn spec(&self) -> &ProxySpec {
        &self.spec
    }
}

impl ProxyFactory for HttpProxyFactory {
    fn create_proxy(&self) -> Result<Box<dyn ResourceProxy>, FetchError> {
        let authority = self.spec.authority()?;
        let proxy = match self.spec.method {
            ProxyMethod::Http => {
                HttpResourceProxy::new(&authority, self.transport.clone(), self.clock.clone())?
            }
            ProxyMethod::Https => {
                HttpResourceProxy::https(&authority, self.transport.clone(), self.clock.clone())?
            }
        };
        Ok(Box::new(proxy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::proxy::transport::tests::MockTransport;

    #[test]
    fn test_extra_layout() {
        let spec = ProxySpec::http("http://a.b/").unwrap();
        let mut expected = vec![0, 0, 0, 11];
        for unit in "http://a.b/".encode_utf16() {
            expected.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(spec.extra(), expected.as_slice());
        assert_eq!(spec.method().wire(), 0x1);
    }

    #[test]
    fn test_from_parts_tolerates_padding() {
        let spec = ProxySpec::https("https://secure.example/").unwrap();
        let mut padded = spec.extra().to_vec();
        padded.resize(256, 0);
        let back = ProxySpec::from_parts(0x2, &padded).unwrap();
        assert_eq!(back, spec);
        assert_eq!(back.authority().unwrap(), "https://secure.example/");
    }

    #[test]
    fn test_method_must_match_scheme() {
        assert!(ProxySpec::http("https://x.example").is_err());
        assert!(ProxySpec::https("http://x.example").is_err());
        assert!(ProxySpec::from_parts(0x3, &[]).is_err());
    }

    #[test]
    fn test_from_str_picks_method() {
        let spec: ProxySpec = "HTTPS://x.example".parse().unwrap();
        assert_eq!(spec.method(), ProxyMethod::Https);
        let spec: ProxySpec = "http://x.example".parse().unwrap();
        assert_eq!(spec.method(), ProxyMethod::Http);
        assert_eq!(spec.to_string(), "http://x.example/");
    }

    #[test]
    fn test_factory_builds_proxies() {
        let spec = ProxySpec::http("http://x.example").unwrap();
        let factory = HttpProxyFactory::new(
            spec,
            Arc::new(MockTransport::new(vec![])),
            Arc::new(FixedClock::new(0)),
        );
        assert!(factory.create_proxy().is_ok());
        assert!(factory.create_proxy().is_ok());
    }
}
