use std::io::Write;

use tack::http::request::{Request, canonical_key, split_target};

#[test]
fn test_request_new_splits_target() {
    let req = Request::new("GET", "/search?q=rust", "HTTP/1.1");

    assert_eq!(req.method, "GET");
    assert_eq!(req.path, "/search");
    assert_eq!(req.query, "q=rust");
    assert_eq!(req.full_path(), "/search?q=rust");
}

#[test]
fn test_request_full_path_without_query() {
    let req = Request::new("GET", "/", "HTTP/1.1");
    assert_eq!(req.full_path(), "/");
}

#[test]
fn test_request_header_retrieval() {
    let mut req = Request::new("GET", "/", "HTTP/1.1");
    req.set_header(canonical_key("Host"), "example.com".to_string());
    req.set_header(canonical_key("X-Request-Id"), "abc".to_string());

    assert_eq!(req.header("HTTP_HOST"), Some("example.com"));
    assert_eq!(req.header("HTTP_X_REQUEST_ID"), Some("abc"));
    assert_eq!(req.header("HTTP_MISSING"), None);
}

#[test]
fn test_request_set_header_replaces_in_place() {
    let mut req = Request::new("GET", "/", "HTTP/1.1");
    req.set_header("HTTP_A".into(), "1".into());
    req.set_header("HTTP_B".into(), "2".into());
    req.set_header("HTTP_A".into(), "3".into());

    assert_eq!(
        req.headers,
        vec![
            ("HTTP_A".to_string(), "3".to_string()),
            ("HTTP_B".to_string(), "2".to_string()),
        ]
    );
}

#[test]
fn test_request_get_standard_keys() {
    let mut req = Request::new("PUT", "/x?y", "HTTP/1.0");
    req.remote_addr = "127.0.0.1".into();
    req.server_name = "example.com".into();
    req.server_port = "8080".into();
    req.content_length = 12;

    assert_eq!(req.get("REQUEST_METHOD").as_deref(), Some("PUT"));
    assert_eq!(req.get("QUERY_STRING").as_deref(), Some("y"));
    assert_eq!(req.get("HTTP_VERSION").as_deref(), Some("HTTP/1.0"));
    assert_eq!(req.get("SERVER_PROTOCOL").as_deref(), Some("HTTP/1.0"));
    assert_eq!(req.get("REMOTE_ADDR").as_deref(), Some("127.0.0.1"));
    assert_eq!(req.get("SERVER_NAME").as_deref(), Some("example.com"));
    assert_eq!(req.get("SERVER_PORT").as_deref(), Some("8080"));
    assert_eq!(req.get("CONTENT_LENGTH").as_deref(), Some("12"));
    assert_eq!(req.get("CONTENT_TYPE"), None);
}

#[test]
fn test_split_target() {
    assert_eq!(split_target("/a?b?c"), ("/a?b", "c"));
    assert_eq!(split_target("/a"), ("/a", ""));
}

#[test]
fn test_canonical_key() {
    assert_eq!(canonical_key("X-Foo-Bar"), "HTTP_X_FOO_BAR");
    assert_eq!(canonical_key("Content-Length"), "CONTENT_LENGTH");
    assert_eq!(canonical_key("CONTENT-type"), "CONTENT_TYPE");
}

#[test]
fn test_request_error_sink_accepts_writes() {
    let mut req = Request::new("GET", "/", "HTTP/1.1");
    writeln!(req.errors, "something odd happened").unwrap();
    write!(req.errors, "partial").unwrap();
    req.errors.flush().unwrap();
}
