use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Write};

use bytes::Bytes;
use missive::Error;
use missive::http::body::{Body, Data, Form, NamedFile, encode_data};
use missive::http::multipart::{FileContent, FilePart, encode_files, encode_files_with_boundary};

fn files(entries: Vec<(&str, FilePart)>) -> Vec<(String, FilePart)> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[test]
fn test_form_keeps_pair_order() {
    let form = Form::from(vec![("b", "2"), ("a", "1")]);
    assert_eq!(form.urlencode(), "b=2&a=1");
}

#[test]
fn test_form_from_btreemap_is_sorted() {
    let mut map = BTreeMap::new();
    map.insert("z", "last");
    map.insert("a", "first");
    assert_eq!(Form::from(map).urlencode(), "a=first&z=last");
}

#[test]
fn test_form_from_hashmap_contains_every_pair() {
    let mut map = HashMap::new();
    map.insert("x", "1");
    map.insert("y", "2");
    let encoded = Form::from(map).urlencode();
    let mut parts: Vec<&str> = encoded.split('&').collect();
    parts.sort();
    assert_eq!(parts, vec!["x=1", "y=2"]);
}

#[test]
fn test_form_expands_lists_and_drops_none() {
    let form = Form::new()
        .field("tag", vec![Some("a"), None, Some("b")])
        .field("skip", Option::<String>::None)
        .field("n", 42);
    assert_eq!(form.urlencode(), "tag=a&tag=b&n=42");
}

#[test]
fn test_form_escapes_reserved_characters() {
    let form = Form::new().field("q", "a b&c=d").field("ü", "é");
    assert_eq!(form.urlencode(), "q=a+b%26c%3Dd&%C3%BC=%C3%A9");
}

#[test]
fn test_encode_data_passes_raw_bodies_through() {
    let body = encode_data(&Data::from("already=encoded")).unwrap();
    assert_eq!(body.as_bytes().unwrap(), "already=encoded");

    let body = encode_data(&Data::from(vec![0u8, 1, 2])).unwrap();
    assert_eq!(body.as_bytes().unwrap().as_ref(), &[0u8, 1, 2]);

    assert!(encode_data(&Data::Empty).is_none());
}

#[test]
fn test_encode_data_keeps_streams() {
    let data = Data::stream(Cursor::new(b"stream".to_vec()));
    let body = encode_data(&data).unwrap();
    assert!(body.is_stream());
    assert_eq!(body.len(), Some(6));
    if let (Body::Stream(a), Data::Stream(b)) = (&body, &data) {
        assert!(a.same_stream(b));
    }
}

#[test]
fn test_multipart_layout() {
    let data = Data::from(Form::new().field("field", "value"));
    let parts = files(vec![(
        "upload",
        FilePart::from(("report.csv", "a,b\n", "text/csv")),
    )]);

    let (body, content_type) = encode_files_with_boundary(&parts, &data, "BOUNDARY").unwrap();

    assert_eq!(content_type, "multipart/form-data; boundary=BOUNDARY");
    let expected = "--BOUNDARY\r\n\
        Content-Disposition: form-data; name=\"field\"\r\n\r\n\
        value\r\n\
        --BOUNDARY\r\n\
        Content-Disposition: form-data; name=\"upload\"; filename=\"report.csv\"\r\n\
        Content-Type: text/csv\r\n\r\n\
        a,b\n\r\n\
        --BOUNDARY--\r\n";
    assert_eq!(body, Bytes::from(expected));
}

#[test]
fn test_multipart_extra_headers_follow_content_type() {
    let parts = files(vec![(
        "f",
        FilePart::from((
            "a.bin",
            vec![1u8, 2],
            "application/octet-stream",
            vec![("X-Checksum".to_string(), "abc".to_string())],
        )),
    )]);
    let (body, _) = encode_files_with_boundary(&parts, &Data::Empty, "b").unwrap();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains(
        "Content-Type: application/octet-stream\r\nX-Checksum: abc\r\n\r\n\u{1}\u{2}\r\n"
    ));
}

#[test]
fn test_multipart_filename_falls_back_to_key() {
    let parts = files(vec![("doc", FilePart::new("contents"))]);
    let (body, _) = encode_files_with_boundary(&parts, &Data::Empty, "b").unwrap();
    assert!(String::from_utf8_lossy(&body).contains("name=\"doc\"; filename=\"doc\""));
}

#[test]
fn test_multipart_filename_can_be_omitted() {
    let parts = files(vec![("doc", FilePart::new("contents").without_file_name())]);
    let (body, _) = encode_files_with_boundary(&parts, &Data::Empty, "b").unwrap();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("name=\"doc\"\r\n"));
    assert!(!text.contains("filename"));
}

#[test]
fn test_multipart_reads_named_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::File::create(&path)
        .unwrap()
        .write_all(b"from disk")
        .unwrap();

    let part = FilePart::new(FileContent::reader(NamedFile::open(&path).unwrap()));
    let parts = files(vec![("attachment", part)]);
    let (body, _) = encode_files_with_boundary(&parts, &Data::Empty, "b").unwrap();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("name=\"attachment\"; filename=\"notes.txt\""));
    assert!(text.contains("\r\n\r\nfrom disk\r\n"));
}

#[test]
fn test_multipart_escapes_quotes_in_names() {
    let parts = files(vec![("a\"b", FilePart::from(("x\ny.txt", "z")))]);
    let (body, _) = encode_files_with_boundary(&parts, &Data::Empty, "b").unwrap();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("name=\"a%22b\"; filename=\"x%0Ay.txt\""));
}

#[test]
fn test_multipart_escapes_control_characters() {
    let parts = files(vec![("a\tb\u{1}c\u{1b}", FilePart::from(("r\u{7f}\u{0}.txt", "z")))]);
    let (body, _) = encode_files_with_boundary(&parts, &Data::Empty, "b").unwrap();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("name=\"a%09b%01c\u{1b}\"; filename=\"r\u{7f}%00.txt\""));
}

#[test]
fn test_multipart_requires_files() {
    let err = encode_files(&[], &Data::Empty).unwrap_err();
    assert!(matches!(&err, Error::InvalidValue(msg) if msg == "Files must be provided."));
}

#[test]
fn test_multipart_rejects_string_data() {
    let parts = files(vec![("f", FilePart::new("x"))]);
    let err = encode_files(&parts, &Data::from("raw")).unwrap_err();
    assert!(matches!(&err, Error::InvalidValue(msg) if msg == "Data must not be a string."));
}

#[test]
fn test_generated_boundary_is_32_hex_chars() {
    let parts = files(vec![("f", FilePart::new("x"))]);
    let (_, content_type) = encode_files(&parts, &Data::Empty).unwrap();
    let boundary = content_type
        .strip_prefix("multipart/form-data; boundary=")
        .unwrap();
    assert_eq!(boundary.len(), 32);
    assert!(boundary.bytes().all(|b| b.is_ascii_hexdigit()));
}
