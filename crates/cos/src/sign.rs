//! Time-windowed HMAC-SHA1 request signing.
//!
//! Implements the COS `q-sign-algorithm=sha1` scheme: a signing key is
//! derived from the secret key over a validity window, the request is
//! canonicalized (lowercased method, path, sorted query, encoded
//! headers), and the resulting signature is assembled into the
//! `Authorization` header value.

use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha1::{Digest, Sha1};

use crate::config::CosCredentials;

type HmacSha1 = Hmac<Sha1>;

/// Signature validity window in seconds.
pub const SIGN_WINDOW_SECS: i64 = 3600;

/// Everything outside RFC 3986 unreserved is escaped, `/` included.
const STRICT_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Builds the `Authorization` value for one request.
///
/// `uri` is the object path with an optional query string, e.g.
/// `/photo.jpg?uploads`. `now` is a unix timestamp injected by the
/// caller so signatures are reproducible under test; the signature is
/// valid from `now` for [`SIGN_WINDOW_SECS`].
pub fn authorization(
    creds: &CosCredentials,
    method: &str,
    uri: &str,
    content_type: &str,
    host: &str,
    now: i64,
) -> String {
    let key_time = format!("{now};{}", now + SIGN_WINDOW_SECS);

    let (path, query) = match uri.split_once('?') {
        Some((path, query)) => (path, query),
        None => (uri, ""),
    };
    let (param_list, canonical_query) = canonicalize_query(query);
    let canonical_headers = canonicalize_headers(content_type, host);

    // The derived key is used in its ASCII hex form, not as raw bytes.
    let sign_key = hmac_sha1_hex(creds.secret_key.as_bytes(), key_time.as_bytes());

    let http_string = format!(
        "{}\n{path}\n{canonical_query}\n{canonical_headers}\n",
        method.to_lowercase()
    );
    let string_to_sign = format!("sha1\n{key_time}\n{}\n", sha1_hex(http_string.as_bytes()));
    let signature = hmac_sha1_hex(sign_key.as_bytes(), string_to_sign.as_bytes());

    format!(
        "q-sign-algorithm=sha1&q-ak={}&q-sign-time={key_time}&q-key-time={key_time}\
         &q-header-list=content-type;host&q-url-param-list={param_list}&q-signature={signature}",
        creds.secret_id
    )
}

/// Sorts query parameters by name. Returns the semicolon-joined name
/// list and the `&`-joined `name=value` pairs, both empty for an empty
/// query.
fn canonicalize_query(query: &str) -> (String, String) {
    if query.is_empty() {
        return (String::new(), String::new());
    }
    let mut params: Vec<(&str, &str)> = query
        .split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .collect();
    params.sort_by(|a, b| a.0.cmp(b.0));

    let names: Vec<&str> = params.iter().map(|(name, _)| *name).collect();
    let pairs: Vec<String> = params
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    (names.join(";"), pairs.join("&"))
}

fn canonicalize_headers(content_type: &str, host: &str) -> String {
    let mut headers = [("content-type", content_type), ("host", host)];
    headers.sort_by(|a, b| a.0.cmp(b.0));
    headers
        .iter()
        .map(|(name, value)| format!("{name}={}", utf8_percent_encode(value, STRICT_ENCODE)))
        .collect::<Vec<_>>()
        .join("&")
}

fn hmac_sha1_hex(key: &[u8], data: &[u8]) -> String {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "lumen-shots-1250000000.cos.ap-guangzhou.myqcloud.com";
    const NOW: i64 = 1_700_000_000;

    fn creds() -> CosCredentials {
        CosCredentials {
            secret_id: "AKIDLumenExample".into(),
            secret_key: "ExampleSecretKey".into(),
        }
    }

    // Expected values recorded from an independent implementation of the
    // scheme, so canonicalization regressions show up as diffs here.

    #[test]
    fn put_object_signature() {
        let auth = authorization(&creds(), "PUT", "/capture_001.jpg", "image/jpeg", HOST, NOW);
        assert_eq!(
            auth,
            "q-sign-algorithm=sha1&q-ak=AKIDLumenExample\
             &q-sign-time=1700000000;1700003600&q-key-time=1700000000;1700003600\
             &q-header-list=content-type;host&q-url-param-list=\
             &q-signature=50bfe818fbe642e1daae766560070e9b2984f289"
        );
    }

    #[test]
    fn initiate_multipart_signature() {
        let auth = authorization(
            &creds(),
            "POST",
            "/capture_001.jpg?uploads",
            "image/jpeg",
            HOST,
            NOW,
        );
        assert!(auth.contains("&q-url-param-list=uploads&"));
        assert!(auth.ends_with("&q-signature=61e93b2e878a8f1a604596ba2ee69b2326a0651b"));
    }

    #[test]
    fn part_upload_signature() {
        let auth = authorization(
            &creds(),
            "PUT",
            "/capture_001.jpg?partNumber=2&uploadId=example-upload-id",
            "application/octet-stream",
            HOST,
            NOW,
        );
        assert!(auth.contains("&q-url-param-list=partNumber;uploadId&"));
        assert!(auth.ends_with("&q-signature=106e99b4ede2f885d29b8bb4978b986b38bada25"));
    }

    #[test]
    fn sign_time_spans_the_window() {
        let auth = authorization(&creds(), "GET", "/x", "text/plain", HOST, 100);
        assert!(auth.contains("q-sign-time=100;3700"));
        assert!(auth.contains("q-key-time=100;3700"));
    }

    #[test]
    fn query_names_are_sorted() {
        let (names, pairs) = canonicalize_query("uploadId=abc&partNumber=7");
        assert_eq!(names, "partNumber;uploadId");
        assert_eq!(pairs, "partNumber=7&uploadId=abc");
    }

    #[test]
    fn valueless_params_keep_empty_values() {
        let (names, pairs) = canonicalize_query("uploads");
        assert_eq!(names, "uploads");
        assert_eq!(pairs, "uploads=");
    }

    #[test]
    fn header_values_are_strictly_encoded() {
        // '/' is escaped, unreserved characters pass through.
        assert_eq!(
            canonicalize_headers("image/jpeg", "a-b.c_d~e"),
            "content-type=image%2Fjpeg&host=a-b.c_d~e"
        );
    }

    #[test]
    fn signature_depends_on_method_case_insensitively() {
        let a = authorization(&creds(), "put", "/k", "image/jpeg", HOST, NOW);
        let b = authorization(&creds(), "PUT", "/k", "image/jpeg", HOST, NOW);
        assert_eq!(a, b);
    }
}
