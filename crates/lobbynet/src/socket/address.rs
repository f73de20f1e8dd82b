//! Synthetic socket addresses built from endpoint ids.
//!
//! The transport has no IP addresses, only small endpoint ids. An address carries the id in
//! both its "ip" and its "port"; the text form is `<prefix><id>[:<port>]`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use lobbynet_proto::EndpointId;

#[derive(Debug, Clone)]
pub struct VirtualAddr {
    prefix: Arc<str>,
    id: EndpointId,
    port: u16,
}

impl VirtualAddr {
    pub fn new(prefix: Arc<str>, id: EndpointId) -> Self {
        Self {
            prefix,
            id,
            port: id.get(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Parses `<prefix><id>[:<port>]`. The port follows the last `:`; without one it is 0.
    pub fn parse(prefix: &Arc<str>, text: &str) -> Option<Self> {
        let rest = text.strip_prefix(&**prefix)?;
        let (id, port) = match rest.rfind(':') {
            Some(idx) => (&rest[..idx], rest[idx + 1..].parse::<u16>().ok()?),
            None => (rest, 0),
        };
        let id = id.parse::<u16>().ok()?;
        Some(Self {
            prefix: prefix.clone(),
            id: EndpointId(id),
            port,
        })
    }

    pub fn endpoint_id(&self) -> EndpointId {
        self.id
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_valid(&self) -> bool {
        self.id.is_valid()
    }

    pub fn to_text(&self, with_port: bool) -> String {
        if with_port {
            format!("{}{}:{}", self.prefix, self.id, self.port)
        } else {
            format!("{}{}", self.prefix, self.id)
        }
    }
}

impl fmt::Display for VirtualAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}:{}", self.prefix, self.id, self.port)
    }
}

// Identity is the endpoint id alone; prefix and port never distinguish two peers.
impl PartialEq for VirtualAddr {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for VirtualAddr {}

impl Hash for VirtualAddr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn prefix() -> Arc<str> {
        Arc::from("lobbynet.")
    }

    #[test]
    fn text_forms() {
        let addr = VirtualAddr::new(prefix(), EndpointId(17));
        assert_eq!(addr.to_text(false), "lobbynet.17");
        assert_eq!(addr.to_text(true), "lobbynet.17:17");
        assert_eq!(addr.to_string(), "lobbynet.17:17");
    }

    #[test]
    fn parse_port_after_last_colon() {
        let addr = VirtualAddr::parse(&prefix(), "lobbynet.5:7777").unwrap();
        assert_eq!(addr.endpoint_id(), EndpointId(5));
        assert_eq!(addr.port(), 7777);

        let bare = VirtualAddr::parse(&prefix(), "lobbynet.9").unwrap();
        assert_eq!(bare.port(), 0);
        assert!(bare.is_valid());
    }

    #[test]
    fn parse_rejects_foreign_text() {
        assert!(VirtualAddr::parse(&prefix(), "10.0.0.1:7777").is_none());
        assert!(VirtualAddr::parse(&prefix(), "lobbynet.x").is_none());
        assert!(VirtualAddr::parse(&prefix(), "lobbynet.3:port").is_none());
        assert!(!VirtualAddr::parse(&prefix(), "lobbynet.0").unwrap().is_valid());
    }

    #[test]
    fn equality_ignores_port() {
        let a = VirtualAddr::new(prefix(), EndpointId(4));
        let b = VirtualAddr::new(prefix(), EndpointId(4)).with_port(9000);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert!(!set.contains(&VirtualAddr::new(prefix(), EndpointId(5))));
    }
}
