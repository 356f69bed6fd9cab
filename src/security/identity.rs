//! Rate-limit partition keys.

use std::fmt;

/// Key under which all adaptive limiter state for a caller is stored.
///
/// Built from the client IP, the optional opaque user id header and the
/// `jti` of a verified token. Callers with a valid token get their own
/// partition; everybody else behind an IP shares one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn new(ip: &str, uid: Option<&str>, jti: Option<&str>) -> Self {
        let key = match (uid, jti) {
            (Some(uid), Some(jti)) => format!("ip:{ip}|uid:{uid}|tok:{jti}"),
            (None, Some(jti)) => format!("ip:{ip}|tok:{jti}"),
            (Some(uid), None) => format!("ip:{ip}|uid:{uid}"),
            (None, None) => format!("ip:{ip}"),
        };
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        assert_eq!(ClientKey::new("1.2.3.4", None, None).as_str(), "ip:1.2.3.4");
        assert_eq!(
            ClientKey::new("1.2.3.4", Some("u1"), None).as_str(),
            "ip:1.2.3.4|uid:u1"
        );
        assert_eq!(
            ClientKey::new("1.2.3.4", None, Some("j1")).as_str(),
            "ip:1.2.3.4|tok:j1"
        );
        assert_eq!(
            ClientKey::new("1.2.3.4", Some("u1"), Some("j1")).to_string(),
            "ip:1.2.3.4|uid:u1|tok:j1"
        );
    }
}
