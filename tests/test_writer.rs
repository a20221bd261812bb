use std::io::{self, Cursor};

use missive::http::body::{Data, PlainReader};
use missive::http::request::RequestSpec;
use missive::http::writer::{MessageWriter, serialize_request};

#[test]
fn test_serialize_get_adds_host() {
    let prepared = RequestSpec::new("GET", "http://example.com:8080/search?q=1")
        .header("Accept", "*/*")
        .prepare()
        .unwrap();
    let wire = serialize_request(&prepared).unwrap();
    assert_eq!(
        String::from_utf8(wire).unwrap(),
        "GET /search?q=1 HTTP/1.1\r\nHost: example.com:8080\r\nAccept: */*\r\n\r\n"
    );
}

#[test]
fn test_explicit_host_is_not_duplicated() {
    let prepared = RequestSpec::new("GET", "http://example.com/")
        .header("Host", "virtual.test")
        .prepare()
        .unwrap();
    let wire = String::from_utf8(serialize_request(&prepared).unwrap()).unwrap();
    assert_eq!(wire.matches("Host:").count(), 1);
    assert!(wire.contains("Host: virtual.test\r\n"));
}

#[test]
fn test_serialize_form_post() {
    let prepared = RequestSpec::new("POST", "http://example.com/form")
        .form([("a", "1")])
        .prepare()
        .unwrap();
    let wire = String::from_utf8(serialize_request(&prepared).unwrap()).unwrap();
    assert!(wire.starts_with("POST /form HTTP/1.1\r\nHost: example.com\r\n"));
    assert!(wire.contains("Content-Length: 3\r\n"));
    assert!(wire.ends_with("\r\n\r\na=1"));
}

#[test]
fn test_serialize_sized_stream() {
    let prepared = RequestSpec::new("PUT", "http://example.com/blob")
        .data(Data::stream(Cursor::new(b"payload".to_vec())))
        .prepare()
        .unwrap();
    let wire = String::from_utf8(serialize_request(&prepared).unwrap()).unwrap();
    assert!(wire.contains("Content-Length: 7\r\n"));
    assert!(wire.ends_with("\r\n\r\npayload"));
}

#[test]
fn test_serialize_chunked_stream() {
    let prepared = RequestSpec::new("POST", "http://example.com/upload")
        .data(Data::stream(PlainReader(Cursor::new(b"hello".to_vec()))))
        .prepare()
        .unwrap();
    let wire = String::from_utf8(serialize_request(&prepared).unwrap()).unwrap();
    assert!(wire.contains("Transfer-Encoding: chunked\r\n"));
    assert!(wire.ends_with("\r\n\r\n5\r\nhello\r\n0\r\n\r\n"));
}

#[test]
fn test_serialize_empty_chunked_stream() {
    let prepared = RequestSpec::new("POST", "http://example.com/upload")
        .data(Data::stream(PlainReader(io::empty())))
        .prepare()
        .unwrap();
    let wire = String::from_utf8(serialize_request(&prepared).unwrap()).unwrap();
    assert!(wire.ends_with("\r\n\r\n0\r\n\r\n"));
}

#[tokio::test]
async fn test_message_writer_writes_everything() {
    let prepared = RequestSpec::new("DELETE", "http://example.com/items/3")
        .prepare()
        .unwrap();
    let mut writer = MessageWriter::new(&prepared).unwrap();
    let expected = writer.as_bytes().to_vec();

    let mut sink: Vec<u8> = Vec::new();
    writer.write_to(&mut sink).await.unwrap();
    assert_eq!(sink, expected);
    assert!(
        String::from_utf8(sink)
            .unwrap()
            .starts_with("DELETE /items/3 HTTP/1.1\r\n")
    );
}

#[tokio::test]
async fn test_message_writer_over_duplex() {
    use tokio::io::AsyncReadExt;

    let prepared = RequestSpec::new("POST", "http://example.com/")
        .data("ping")
        .prepare()
        .unwrap();
    let mut writer = MessageWriter::new(&prepared).unwrap();
    let len = writer.as_bytes().len();

    let (mut client, mut server) = tokio::io::duplex(8);
    let send = tokio::spawn(async move {
        writer.write_to(&mut client).await.unwrap();
    });

    let mut received = vec![0u8; len];
    server.read_exact(&mut received).await.unwrap();
    send.await.unwrap();

    let text = String::from_utf8(received).unwrap();
    assert!(text.ends_with("Content-Length: 4\r\n\r\nping"));
}
