//! Request and server descriptors handed to storages by the host.

/// The parts of an incoming request a storage cares about.
///
/// ```
/// use tc_storage::RequestParameters;
///
/// let request = RequestParameters::new("/unsafe/300x200/image.jpg")
///     .max_age(0)
///     .accepts_webp(true);
///
/// assert_eq!(request.url(), "/unsafe/300x200/image.jpg");
/// assert_eq!(request.max_age_hint(), Some(0));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParameters {
    url: String,
    max_age: Option<u64>,
    accepts_webp: bool,
}

impl RequestParameters {
    /// Creates parameters for the given request URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_age: None,
            accepts_webp: false,
        }
    }

    /// Sets the cache-control max-age hint carried by the request.
    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Marks whether the client advertised WebP support.
    pub fn accepts_webp(mut self, accepts: bool) -> Self {
        self.accepts_webp = accepts;
        self
    }

    /// Request URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Max-age hint, if the request carried one.
    pub fn max_age_hint(&self) -> Option<u64> {
        self.max_age
    }

    /// Whether the client accepts WebP.
    pub fn webp_accepted(&self) -> bool {
        self.accepts_webp
    }
}

/// Process-wide server settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerParameters {
    security_key: Option<String>,
}

impl ServerParameters {
    /// Creates server parameters without a signing key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the process-wide URL signing key.
    pub fn security_key(mut self, key: impl Into<String>) -> Self {
        self.security_key = Some(key.into());
        self
    }

    /// The signing key, when one is configured and non-empty.
    pub fn signing_key(&self) -> Option<&str> {
        self.security_key.as_deref().filter(|key| !key.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = RequestParameters::new("/image.jpg");
        assert_eq!(request.max_age_hint(), None);
        assert!(!request.webp_accepted());
    }

    #[test]
    fn test_empty_security_key_is_absent() {
        assert_eq!(ServerParameters::new().security_key("").signing_key(), None);
        assert_eq!(ServerParameters::new().signing_key(), None);
        assert_eq!(
            ServerParameters::new().security_key("ACME-SEC").signing_key(),
            Some("ACME-SEC")
        );
    }
}
