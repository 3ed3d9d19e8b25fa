use std::io::{Read, Seek, SeekFrom};

use tack::http::body::{DEFAULT_SPOOL_THRESHOLD, RewindableBody};

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn read_all(body: &mut RewindableBody) -> Vec<u8> {
    let mut out = Vec::new();
    body.read_to_end(&mut out).unwrap();
    out
}

#[test]
fn test_default_threshold() {
    assert_eq!(DEFAULT_SPOOL_THRESHOLD, 114_688);
}

#[tokio::test]
async fn test_zero_length_body_is_empty() {
    let mut src: &[u8] = b"ignored";
    let mut body = RewindableBody::read_from(&mut src, 0, DEFAULT_SPOOL_THRESHOLD, None)
        .await
        .unwrap();

    assert!(!body.is_spooled());
    assert!(read_all(&mut body).is_empty());
    assert_eq!(src, b"ignored");
}

#[tokio::test]
async fn test_small_body_stays_in_memory() {
    let data = pattern(DEFAULT_SPOOL_THRESHOLD);
    let mut src = data.as_slice();
    let mut body = RewindableBody::read_from(&mut src, data.len(), DEFAULT_SPOOL_THRESHOLD, None)
        .await
        .unwrap();

    assert!(!body.is_spooled());
    assert_eq!(body.stream_position().unwrap(), 0);
    assert_eq!(read_all(&mut body), data);
}

#[tokio::test]
async fn test_large_body_is_spooled_and_starts_at_zero() {
    let data = pattern(DEFAULT_SPOOL_THRESHOLD + 1);
    let mut src = data.as_slice();
    let mut body = RewindableBody::read_from(&mut src, data.len(), DEFAULT_SPOOL_THRESHOLD, None)
        .await
        .unwrap();

    assert!(body.is_spooled());
    assert_eq!(body.stream_position().unwrap(), 0);
    assert_eq!(read_all(&mut body), data);
}

#[tokio::test]
async fn test_body_reads_exactly_declared_length() {
    let mut src: &[u8] = b"0123456789";
    let mut body = RewindableBody::read_from(&mut src, 4, 2, None).await.unwrap();

    assert!(body.is_spooled());
    assert_eq!(read_all(&mut body), b"0123");
    assert_eq!(src, b"456789");
}

#[tokio::test]
async fn test_rewind_rereads_from_start() {
    for threshold in [1024, 4] {
        let mut src: &[u8] = b"hello world";
        let mut body = RewindableBody::read_from(&mut src, 11, threshold, None)
            .await
            .unwrap();

        assert_eq!(read_all(&mut body), b"hello world");
        body.rewind().unwrap();
        assert_eq!(read_all(&mut body), b"hello world");

        body.seek(SeekFrom::Start(6)).unwrap();
        assert_eq!(read_all(&mut body), b"world");
    }
}

#[tokio::test]
async fn test_spool_file_is_never_visible_in_spool_dir() {
    let dir = tempfile::tempdir().unwrap();
    let data = pattern(200_000);
    let mut src = data.as_slice();
    let mut body = RewindableBody::read_from(
        &mut src,
        data.len(),
        DEFAULT_SPOOL_THRESHOLD,
        Some(dir.path()),
    )
    .await
    .unwrap();

    assert!(body.is_spooled());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(read_all(&mut body), data);

    body.release();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let mut src: &[u8] = b"abcdefgh";
    let mut body = RewindableBody::read_from(&mut src, 8, 4, None).await.unwrap();

    body.release();
    assert!(body.is_released());
    body.release();
    assert!(body.is_released());
    assert!(read_all(&mut body).is_empty());

    let mut src: &[u8] = b"abc";
    let mut body = RewindableBody::read_from(&mut src, 3, 1024, None).await.unwrap();
    body.release();
    body.release();
    assert!(read_all(&mut body).is_empty());
}
