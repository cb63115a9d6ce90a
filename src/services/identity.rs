//! Identity codec
//!
//! Reversible mapping between upstream URLs and the opaque identifiers handed
//! to clients. The same base64 payload (percent-encoded) forms the image
//! relay path.

use base64::{engine::general_purpose::STANDARD, Engine};
use url::Url;

use crate::error::{ScrapeError, ScrapeResult};

/// Namespace prefix of every identifier this add-on issues
pub const ID_PREFIX: &str = "animeonline_";

/// Encode an absolute URL as an opaque identifier
pub fn encode(url: &str) -> String {
    format!("{}{}", ID_PREFIX, STANDARD.encode(url.as_bytes()))
}

/// Decode an identifier produced by [`encode`]
pub fn decode(id: &str) -> ScrapeResult<String> {
    let payload = id
        .strip_prefix(ID_PREFIX)
        .ok_or_else(|| ScrapeError::MalformedIdentifier(format!("missing prefix: {}", id)))?;
    decode_payload(payload)
}

/// Decode a bare base64 payload into an absolute http(s) URL
pub fn decode_payload(payload: &str) -> ScrapeResult<String> {
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ScrapeError::MalformedIdentifier(e.to_string()))?;
    let text =
        String::from_utf8(bytes).map_err(|e| ScrapeError::MalformedIdentifier(e.to_string()))?;

    match Url::parse(&text) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(text),
        Ok(parsed) => Err(ScrapeError::MalformedIdentifier(format!(
            "unsupported scheme: {}",
            parsed.scheme()
        ))),
        Err(e) => Err(ScrapeError::MalformedIdentifier(e.to_string())),
    }
}

/// Relay path segment for a target URL: percent-encoded base64
pub fn encode_relay_payload(url: &str) -> String {
    urlencoding::encode(&STANDARD.encode(url.as_bytes())).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let urls = [
            "https://ww3.animeonline.ninja/online/naruto/",
            "https://ww3.animeonline.ninja/episodio/naruto-1x1/?ref=ñ&x=1",
            "http://127.0.0.1:8080/page/2/",
        ];
        for url in urls {
            let id = encode(url);
            assert!(id.starts_with(ID_PREFIX));
            assert_eq!(decode(&id).unwrap(), url);
        }
    }

    #[test]
    fn test_missing_prefix_is_malformed() {
        let raw = STANDARD.encode("https://ww3.animeonline.ninja/");
        assert!(matches!(
            decode(&raw),
            Err(ScrapeError::MalformedIdentifier(_))
        ));
        assert!(matches!(
            decode("tt1234567"),
            Err(ScrapeError::MalformedIdentifier(_))
        ));
    }

    #[test]
    fn test_invalid_payload_is_malformed() {
        assert!(decode("animeonline_!!!not-base64!!!").is_err());
        // valid base64, invalid UTF-8
        let bad = format!("{}{}", ID_PREFIX, STANDARD.encode([0xff, 0xfe, 0xfd]));
        assert!(decode(&bad).is_err());
        // valid text, not a URL
        let text = format!("{}{}", ID_PREFIX, STANDARD.encode("hello"));
        assert!(decode(&text).is_err());
    }

    #[test]
    fn test_relay_payload_is_path_safe() {
        let payload = encode_relay_payload("https://ww3.animeonline.ninja/wp-content/a??b.jpg");
        assert!(!payload.contains('/'));
        assert!(!payload.contains('+'));
        assert!(!payload.contains('='));
        let decoded = urlencoding::decode(&payload).unwrap();
        assert_eq!(
            decode_payload(&decoded).unwrap(),
            "https://ww3.animeonline.ninja/wp-content/a??b.jpg"
        );
    }
}
