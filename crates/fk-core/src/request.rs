//! Request model
//!
//! A [`Request`] is built once per outbound HTTP request from the URL, the
//! source (frame) URL and the resource type supplied by the host, and is then
//! handed to the matching engines.

use crate::domains::is_third_party;
use crate::url::extract_hostname;

// =============================================================================
// Request Types
// =============================================================================

/// Resource category of an outbound HTTP request, as supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Document,
    Subdocument,
    Stylesheet,
    Script,
    Image,
    Font,
    Media,
    XmlHttpRequest,
    Websocket,
    Other,
}

impl RequestType {
    /// The bit for this request type in a [`RequestTypeMask`].
    pub fn mask(self) -> RequestTypeMask {
        match self {
            Self::Document => RequestTypeMask::DOCUMENT,
            Self::Subdocument => RequestTypeMask::SUBDOCUMENT,
            Self::Stylesheet => RequestTypeMask::STYLESHEET,
            Self::Script => RequestTypeMask::SCRIPT,
            Self::Image => RequestTypeMask::IMAGE,
            Self::Font => RequestTypeMask::FONT,
            Self::Media => RequestTypeMask::MEDIA,
            Self::XmlHttpRequest => RequestTypeMask::XMLHTTPREQUEST,
            Self::Websocket => RequestTypeMask::WEBSOCKET,
            Self::Other => RequestTypeMask::OTHER,
        }
    }

    /// Parse from a browser request type string.
    pub fn from_name(name: &str) -> Self {
        match name {
            "document" | "main_frame" => Self::Document,
            "subdocument" | "sub_frame" => Self::Subdocument,
            "stylesheet" => Self::Stylesheet,
            "script" => Self::Script,
            "image" => Self::Image,
            "font" => Self::Font,
            "media" => Self::Media,
            "xmlhttprequest" | "xhr" => Self::XmlHttpRequest,
            "websocket" => Self::Websocket,
            _ => Self::Other,
        }
    }
}

bitflags::bitflags! {
    /// Request type bit mask used by network rules.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RequestTypeMask: u32 {
        const DOCUMENT = 1 << 0;
        const SUBDOCUMENT = 1 << 1;
        const STYLESHEET = 1 << 2;
        const SCRIPT = 1 << 3;
        const IMAGE = 1 << 4;
        const FONT = 1 << 5;
        const MEDIA = 1 << 6;
        const XMLHTTPREQUEST = 1 << 7;
        const WEBSOCKET = 1 << 8;
        const OTHER = 1 << 9;
    }
}

// =============================================================================
// Request
// =============================================================================

/// A request being matched.
#[derive(Debug, Clone)]
pub struct Request {
    /// Full request URL.
    pub url: String,
    /// ASCII-lowercased request URL; the engines scan this copy.
    pub url_lowercase: String,
    /// Hostname extracted from the URL.
    pub hostname: String,
    /// URL of the frame that originated the request, if any.
    pub source_url: Option<String>,
    /// Hostname of the source URL.
    pub source_hostname: Option<String>,
    /// Resource type.
    pub request_type: RequestType,
    /// Whether the request crosses registrable-domain boundaries.
    pub is_third_party: bool,
    /// Host-assigned id correlating request and response phases.
    pub request_id: Option<u64>,
}

impl Request {
    /// Build a request from its URL, optional source URL and resource type.
    pub fn new(url: &str, source_url: Option<&str>, request_type: RequestType) -> Self {
        let hostname = extract_hostname(url).unwrap_or("").to_ascii_lowercase();
        let source_hostname =
            source_url.and_then(extract_hostname).map(|h| h.to_ascii_lowercase());

        let third_party = match &source_hostname {
            Some(source) if !hostname.is_empty() => is_third_party(&hostname, source),
            _ => false,
        };

        Self {
            url: url.to_string(),
            url_lowercase: url.to_ascii_lowercase(),
            hostname,
            source_url: source_url.map(str::to_string),
            source_hostname,
            request_type,
            is_third_party: third_party,
            request_id: None,
        }
    }

    /// Attach the host-assigned request id.
    pub fn with_id(mut self, request_id: u64) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_fields() {
        let request = Request::new(
            "https://CDN.Example.org/Ad.js",
            Some("https://www.example.org/"),
            RequestType::Script,
        );
        assert_eq!(request.url, "https://CDN.Example.org/Ad.js");
        assert_eq!(request.url_lowercase, "https://cdn.example.org/ad.js");
        assert_eq!(request.hostname, "cdn.example.org");
        assert_eq!(request.source_hostname.as_deref(), Some("www.example.org"));
        assert!(!request.is_third_party);
    }

    #[test]
    fn test_request_third_party() {
        let request = Request::new(
            "https://tracker.com/pixel",
            Some("https://www.example.org/"),
            RequestType::Image,
        );
        assert!(request.is_third_party);
    }

    #[test]
    fn test_request_without_source() {
        let request = Request::new("https://example.org/", None, RequestType::Document);
        assert!(!request.is_third_party);
        assert!(request.source_hostname.is_none());
    }

    #[test]
    fn test_request_type_from_name() {
        assert_eq!(RequestType::from_name("script"), RequestType::Script);
        assert_eq!(RequestType::from_name("main_frame"), RequestType::Document);
        assert_eq!(RequestType::from_name("bogus"), RequestType::Other);
    }
}
