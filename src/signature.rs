use crate::constants::RFC1123_GMT;
use crate::credentials::Credentials;
use crate::error::QsError;
use base64::engine::general_purpose;
use base64::Engine;
use hmac::Hmac;
use http::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, DATE};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use sha2::digest::Mac;
use sha2::Sha256;
use time::OffsetDateTime;
use url::Url;

const FRAGMENT: &AsciiSet = &CONTROLS
    // URL_RESERVED
    .add(b':')
    .add(b'?')
    .add(b'#')
    .add(b'[')
    .add(b']')
    .add(b'@')
    .add(b'!')
    .add(b'$')
    .add(b'&')
    .add(b'\'')
    .add(b'(')
    .add(b')')
    .add(b'*')
    .add(b'+')
    .add(b',')
    .add(b';')
    .add(b'=')
    // URL_UNSAFE
    .add(b'"')
    .add(b' ')
    .add(b'<')
    .add(b'>')
    .add(b'%')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^')
    .add(b'`');

const FRAGMENT_SLASH: &AsciiSet = &FRAGMENT.add(b'/');

pub(crate) fn uri_encode(string: &str, encode_slash: bool) -> String {
    if encode_slash {
        utf8_percent_encode(string, FRAGMENT_SLASH).to_string()
    } else {
        utf8_percent_encode(string, FRAGMENT).to_string()
    }
}

/// Path and query the way the signing rules see them: a path of `/` is
/// empty, and every `/` inside the query is `%2F`. Nothing else is escaped
/// here.
pub(crate) fn split_path_and_query(url: &Url) -> (String, Option<String>) {
    let path = match url.path() {
        "/" => String::new(),
        path => path.to_string(),
    };
    let query = url.query().map(encode_query_slashes);
    (path, query)
}

pub(crate) fn encode_query_slashes(query: &str) -> String {
    query.replace('/', "%2F")
}

/// The path-and-query string the server will see after stripping
/// scheme/host, prefixed with the bucket.
pub(crate) fn signing_target(bucket: Option<&str>, url: &Url) -> String {
    let (path, query) = split_path_and_query(url);
    let mut target = String::from("/");
    if let Some(bucket) = bucket {
        target.push_str(bucket);
    }
    if path.is_empty() && query.is_some() {
        // the server keeps the bare `/` in front of a query
        target.push('/');
    }
    target.push_str(&path);
    if let Some(query) = query {
        target.push('?');
        target.push_str(&query);
    }
    target
}

pub(crate) fn canonical_string(
    method: &http::Method,
    content_type: Option<&str>,
    date: &str,
    path_and_query: &str,
) -> String {
    // METHOD\n<content-md5>\n<content-type>\n<date>\n<path-and-query>,
    // with Content-MD5 always empty.
    format!(
        "{}\n\n{}\n{}\n{}",
        method.as_str(),
        content_type.unwrap_or(""),
        date,
        path_and_query
    )
}

/// `QS-HMAC-SHA256 <keyid>:<base64(HMAC-SHA256(canonical, secret))>`, or
/// nothing when either credential half is empty.
pub(crate) fn authorization(
    credentials: &Credentials,
    canonical: &str,
) -> Result<Option<String>, QsError> {
    if !credentials.is_complete() {
        return Ok(None);
    }
    let mut hmac =
        Hmac::<Sha256>::new_from_slice(credentials.secret_access_key.as_ref().as_bytes())?;
    hmac.update(canonical.as_bytes());
    let signature = general_purpose::STANDARD.encode(hmac.finalize().into_bytes());
    Ok(Some(format!(
        "QS-HMAC-SHA256 {}:{}",
        credentials.access_key_id.as_ref(),
        signature
    )))
}

pub(crate) fn format_date(datetime: OffsetDateTime) -> Result<String, QsError> {
    Ok(datetime.format(RFC1123_GMT)?)
}

/// Appends `Content-Length`, `Date`, the optional `Content-Type` and the
/// `Authorization` header for the given request.
pub(crate) fn sign_headers(
    headers: &mut HeaderMap,
    method: &http::Method,
    content_type: Option<&str>,
    content_length: u64,
    path_and_query: &str,
    credentials: &Credentials,
    datetime: OffsetDateTime,
) -> Result<(), QsError> {
    let date = format_date(datetime)?;
    headers.insert(
        CONTENT_LENGTH,
        HeaderValue::try_from(content_length.to_string())?,
    );
    headers.insert(DATE, HeaderValue::try_from(date.as_str())?);
    if let Some(content_type) = content_type {
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type)?);
    }
    let canonical = canonical_string(method, content_type, &date, path_and_query);
    if let Some(authorization) = authorization(credentials, &canonical)? {
        headers.insert(AUTHORIZATION, HeaderValue::try_from(authorization)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use time::Date;

    fn fixed_date() -> OffsetDateTime {
        Date::from_calendar_date(2024, 1.try_into().unwrap(), 1)
            .unwrap()
            .with_hms(0, 0, 0)
            .unwrap()
            .assume_utc()
    }

    #[test]
    fn date_renders_as_rfc1123_gmt() {
        assert_eq!(
            format_date(fixed_date()).unwrap(),
            "Mon, 01 Jan 2024 00:00:00 GMT"
        );
    }

    #[test]
    fn canonical_string_for_a_ranged_get() {
        let canonical = canonical_string(
            &http::Method::GET,
            None,
            "Mon, 01 Jan 2024 00:00:00 GMT",
            "/b/k",
        );
        assert_eq!(canonical, "GET\n\n\nMon, 01 Jan 2024 00:00:00 GMT\n/b/k");
    }

    #[test]
    fn authorization_is_keyid_and_base64_hmac() {
        let credentials = Credentials::new("AKID", "SECRET");
        let canonical = "GET\n\n\nMon, 01 Jan 2024 00:00:00 GMT\n/b/k";

        let mut hmac = Hmac::<Sha256>::new_from_slice(b"SECRET").unwrap();
        hmac.update(canonical.as_bytes());
        let expected = format!(
            "QS-HMAC-SHA256 AKID:{}",
            general_purpose::STANDARD.encode(hmac.finalize().into_bytes())
        );

        assert_eq!(
            authorization(&credentials, canonical).unwrap().unwrap(),
            expected
        );
    }

    #[test]
    fn signing_is_deterministic() {
        let credentials = Credentials::new("AKID", "SECRET");
        let canonical = canonical_string(
            &http::Method::GET,
            None,
            "Mon, 01 Jan 2024 00:00:00 GMT",
            "/b/k",
        );
        let first = authorization(&credentials, &canonical).unwrap().unwrap();
        let second = authorization(&credentials, &canonical).unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn incomplete_credentials_sign_nothing() {
        let credentials = Credentials::new("AKID", "");
        assert!(authorization(&credentials, "GET\n\n\nx\n/").unwrap().is_none());
    }

    #[test]
    fn query_slashes_become_percent_2f() {
        let url = Url::parse("https://h/?x=a/b/c").unwrap();
        assert_eq!(signing_target(Some("bkt"), &url), "/bkt/?x=a%2Fb%2Fc");
    }

    #[test]
    fn encoded_query_has_no_slashes_left() {
        let query = "prefix=a/b&marker=c//d";
        let encoded = encode_query_slashes(query);
        assert_eq!(encoded.matches("%2F").count(), 3);
        assert_eq!(encoded.matches('/').count(), 0);
        assert_eq!(encoded, "prefix=a%2Fb&marker=c%2F%2Fd");
    }

    #[test]
    fn root_path_collapses() {
        let url = Url::parse("https://h/").unwrap();
        let (path, query) = split_path_and_query(&url);
        assert_eq!(path, "");
        assert!(query.is_none());
        assert_eq!(signing_target(Some("b"), &url), "/b");
        assert_eq!(signing_target(None, &url), "/");

        let url = Url::parse("https://h/k").unwrap();
        assert_eq!(signing_target(Some("b"), &url), "/b/k");
    }

    #[test]
    fn signed_headers_carry_the_fixed_set() {
        let credentials = Credentials::new("AKID", "SECRET");
        let mut headers = HeaderMap::new();
        sign_headers(
            &mut headers,
            &http::Method::POST,
            Some("plain/text"),
            7,
            "/b/k?uploads",
            &credentials,
            fixed_date(),
        )
        .unwrap();

        assert_eq!(headers.get(CONTENT_LENGTH).unwrap(), "7");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "plain/text");
        assert_eq!(
            headers.get(DATE).unwrap(),
            "Mon, 01 Jan 2024 00:00:00 GMT"
        );
        let auth = headers.get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert!(auth.starts_with("QS-HMAC-SHA256 AKID:"));
    }

    #[test]
    fn uri_encode_escapes_reserved_characters() {
        assert_eq!(uri_encode("logs/2024 q1", true), "logs%2F2024%20q1");
        assert_eq!(uri_encode("logs/2024 q1", false), "logs/2024%20q1");
    }
}
