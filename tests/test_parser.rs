use std::io::Read;

use tack::http::parser::{ParseError, ParseOptions, parse_request};
use tack::http::request::Request;

async fn parse(raw: &[u8]) -> Result<Option<Request>, ParseError> {
    let mut input = raw;
    parse_request(&mut input, "10.0.0.7", &ParseOptions::default()).await
}

async fn parse_ok(raw: &[u8]) -> Request {
    parse(raw).await.unwrap().expect("a complete request")
}

#[tokio::test]
async fn test_parse_simple_get_request() {
    let req = parse_ok(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n").await;

    assert_eq!(req.method, "GET");
    assert_eq!(req.path, "/");
    assert_eq!(req.query, "");
    assert_eq!(req.version, "HTTP/1.1");
    assert_eq!(req.remote_addr, "10.0.0.7");
    assert_eq!(req.header("HTTP_HOST"), Some("example.com"));
    assert_eq!(req.server_name, "example.com");
    assert_eq!(req.server_port, "");
    assert_eq!(req.content_length, 0);
}

#[tokio::test]
async fn test_parse_path_and_query_split_on_last_question_mark() {
    let req = parse_ok(b"GET /foo?x=1 HTTP/1.1\r\nHost: a:9292\r\n\r\n").await;
    assert_eq!(req.path, "/foo");
    assert_eq!(req.query, "x=1");
    assert_eq!(req.get("REQUEST_PATH").as_deref(), Some("/foo"));
    assert_eq!(req.get("PATH_INFO").as_deref(), Some("/foo"));
    assert_eq!(req.server_name, "a");
    assert_eq!(req.server_port, "9292");

    let req = parse_ok(b"GET /a?b=?c HTTP/1.0\r\nHost: a\r\n\r\n").await;
    assert_eq!(req.path, "/a?b=");
    assert_eq!(req.query, "c");
    assert_eq!(req.version, "HTTP/1.0");
}

#[tokio::test]
async fn test_parse_header_names_are_canonicalized() {
    let req = parse_ok(
        b"GET / HTTP/1.1\r\nHost: h\r\nX-Foo-Bar: baz\r\nuser-agent: test-client\r\nAccept: */*\r\n\r\n",
    )
    .await;

    assert_eq!(req.header("HTTP_X_FOO_BAR"), Some("baz"));
    assert_eq!(req.header("HTTP_USER_AGENT"), Some("test-client"));
    assert_eq!(req.get("HTTP_ACCEPT").as_deref(), Some("*/*"));
    assert_eq!(req.header("X-Foo-Bar"), None);
}

#[tokio::test]
async fn test_parse_repeated_header_last_value_wins_in_first_position() {
    let req = parse_ok(b"GET / HTTP/1.1\r\nX-A: 1\r\nHost: h\r\nX-A: 2\r\n\r\n").await;

    assert_eq!(req.header("HTTP_X_A"), Some("2"));
    let keys: Vec<&str> = req.headers.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["HTTP_X_A", "HTTP_HOST"]);
}

#[tokio::test]
async fn test_parse_content_headers_get_dedicated_fields() {
    let mut req = parse_ok(
        b"POST /api HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: 5\r\n\r\nhello",
    )
    .await;

    assert_eq!(req.content_type.as_deref(), Some("application/json"));
    assert_eq!(req.content_length, 5);
    assert_eq!(req.get("CONTENT_LENGTH").as_deref(), Some("5"));
    assert_eq!(req.header("HTTP_CONTENT_TYPE"), None);

    let mut body = String::new();
    req.body.read_to_string(&mut body).unwrap();
    assert_eq!(body, "hello");
}

#[tokio::test]
async fn test_parse_binary_body() {
    let mut req =
        parse_ok(b"POST /upload HTTP/1.1\r\nHost: h\r\nContent-Length: 4\r\n\r\n\x00\x01\x02\x03")
            .await;

    let mut body = Vec::new();
    req.body.read_to_end(&mut body).unwrap();
    assert_eq!(body, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_parse_bare_newlines_are_accepted() {
    let req = parse_ok(b"DELETE /item/3 HTTP/1.1\nHost: h\n\n").await;
    assert_eq!(req.method, "DELETE");
    assert_eq!(req.path, "/item/3");
}

#[tokio::test]
async fn test_parse_headers_may_end_at_eof() {
    let req = parse_ok(b"GET / HTTP/1.1\r\nHost: h\r\n").await;
    assert_eq!(req.server_name, "h");
}

#[tokio::test]
async fn test_parse_fixed_metadata() {
    let req = parse_ok(b"GET / HTTP/1.1\r\nHost: h\r\n\r\n").await;
    assert_eq!(req.script_name, "");
    assert_eq!(req.get("SCRIPT_NAME").as_deref(), Some(""));
    assert_eq!(req.get("url_scheme").as_deref(), Some("http"));
    assert!(Request::MULTITHREAD);
    assert!(!Request::MULTIPROCESS);
    assert!(!Request::RUN_ONCE);
}

#[tokio::test]
async fn test_parse_empty_stream_is_end_of_stream() {
    assert!(parse(b"").await.unwrap().is_none());
}

#[tokio::test]
async fn test_parse_partial_request_line_is_end_of_stream() {
    assert!(parse(b"GET / HT").await.unwrap().is_none());
}

#[tokio::test]
async fn test_parse_invalid_request_lines() {
    let cases: [&[u8]; 5] = [
        b"get / HTTP/1.1\r\nHost: h\r\n\r\n",
        b"GET / HTTP/2.0\r\nHost: h\r\n\r\n",
        b"GET /\r\nHost: h\r\n\r\n",
        b"GET / HTTP/1.1 extra\r\nHost: h\r\n\r\n",
        b"\r\n",
    ];
    for raw in cases {
        let err = parse(raw).await.unwrap_err();
        assert!(matches!(err, ParseError::InvalidRequestLine), "{raw:?}");
        assert_eq!(err.status().map(|s| s.as_u16()), Some(400));
    }
}

#[tokio::test]
async fn test_parse_malformed_header() {
    let err = parse(b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n").await.unwrap_err();
    assert!(matches!(err, ParseError::InvalidHeader));
}

#[tokio::test]
async fn test_parse_invalid_content_length() {
    let err = parse(b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: lots\r\n\r\n")
        .await
        .unwrap_err();
    assert!(matches!(err, ParseError::InvalidContentLength));
}

#[tokio::test]
async fn test_parse_missing_host_is_rejected() {
    let err = parse(b"GET / HTTP/1.1\r\nAccept: */*\r\n\r\n").await.unwrap_err();
    assert!(matches!(err, ParseError::MissingHost));
    assert_eq!(err.status().map(|s| s.as_u16()), Some(400));
}

#[tokio::test]
async fn test_parse_truncated_body_is_io_error() {
    let err = parse(b"POST /api HTTP/1.1\r\nHost: h\r\nContent-Length: 10\r\n\r\nhello")
        .await
        .unwrap_err();
    assert!(matches!(err, ParseError::Io(_)));
    assert!(err.status().is_none());
}

#[tokio::test]
async fn test_parse_line_limit() {
    let opts = ParseOptions {
        max_line_bytes: 32,
        ..ParseOptions::default()
    };
    let raw = format!("GET / HTTP/1.1\r\nHost: h\r\nX-Long: {}\r\n\r\n", "a".repeat(64));
    let mut input = raw.as_bytes();
    let err = parse_request(&mut input, "peer", &opts).await.unwrap_err();
    assert!(matches!(err, ParseError::HeadersTooLarge));
    assert_eq!(err.status().map(|s| s.as_u16()), Some(431));
}

#[tokio::test]
async fn test_parse_header_count_limit() {
    let opts = ParseOptions {
        max_headers: 2,
        ..ParseOptions::default()
    };
    let mut input: &[u8] = b"GET / HTTP/1.1\r\nHost: h\r\nA: 1\r\nB: 2\r\n\r\n";
    let err = parse_request(&mut input, "peer", &opts).await.unwrap_err();
    assert!(matches!(err, ParseError::HeadersTooLarge));
}

#[tokio::test]
async fn test_parse_leaves_following_bytes_unread() {
    let mut input: &[u8] = b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 2\r\n\r\nokEXTRA";
    let req = parse_request(&mut input, "peer", &ParseOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(req.content_length, 2);
    assert_eq!(input, b"EXTRA");
}
