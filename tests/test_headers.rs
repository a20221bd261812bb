use missive::Error;
use missive::http::headers::{Headers, check_header_validity};

#[test]
fn test_lookup_ignores_case() {
    let mut headers = Headers::new();
    headers.insert("Content-Type", "text/plain");
    assert_eq!(headers.get("content-type"), Some("text/plain"));
    assert!(headers.contains("CONTENT-TYPE"));
}

#[test]
fn test_insert_replaces_and_takes_latest_casing() {
    let mut headers = Headers::new();
    headers.insert("x-token", "a");
    headers.insert("Accept", "*/*");
    headers.insert("X-Token", "b");

    let pairs: Vec<(&str, &str)> = headers.iter().collect();
    assert_eq!(pairs, vec![("X-Token", "b"), ("Accept", "*/*")]);
    assert_eq!(headers.len(), 2);
}

#[test]
fn test_remove() {
    let mut headers = Headers::new();
    headers.insert("A", "1");
    assert_eq!(headers.remove("a"), Some("1".to_string()));
    assert!(headers.is_empty());
    assert_eq!(headers.remove("a"), None);
}

#[test]
fn test_try_from_pairs_validates() {
    let ok = Headers::try_from_pairs([("Accept", "text/html")]).unwrap();
    assert_eq!(ok.get("accept"), Some("text/html"));

    let err = Headers::try_from_pairs([("X-Bad", "value\r\nInjected: yes")]).unwrap_err();
    assert!(matches!(err, Error::InvalidHeader(_)));
}

#[test]
fn test_leading_whitespace_is_rejected() {
    assert!(check_header_validity("X-A", " padded").is_err());
    assert!(check_header_validity("X-A", "\tpadded").is_err());
    assert!(check_header_validity("X-A", "not padded ").is_ok());
}

#[test]
fn test_folded_values_are_allowed() {
    assert!(check_header_validity("X-A", "first\r\n second").is_ok());
    assert!(check_header_validity("X-A", "first\n\tsecond").is_ok());
}

#[test]
fn test_bare_line_breaks_are_rejected() {
    assert!(check_header_validity("X-A", "first\rsecond").is_err());
    assert!(check_header_validity("X-A", "first\nsecond").is_err());
    assert!(check_header_validity("X-A", "trailing\r\n").is_err());
}

#[test]
fn test_bad_names_are_rejected() {
    assert!(check_header_validity("", "v").is_err());
    assert!(check_header_validity("Bad Name", "v").is_err());
    assert!(check_header_validity("Bad:Name", "v").is_err());
    assert!(check_header_validity("Bad\nName", "v").is_err());
}

#[test]
fn test_invalid_value_message_names_the_header() {
    let err = check_header_validity("X-Trace", "a\nb").unwrap_err();
    assert!(err.to_string().contains("X-Trace"));
}
