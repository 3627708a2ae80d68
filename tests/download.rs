use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scribeq::pipeline::{DownloadError, HttpDownloader};

const ONE_MB: u64 = 1_024 * 1_024;

#[tokio::test]
async fn body_is_streamed_to_disk_byte_identical() {
    let server = MockServer::start().await;
    // Non-trivial payload so the transfer spans several chunks.
    let payload: Vec<u8> = (0..128 * 1024).map(|i| (i % 251) as u8).collect();

    Mock::given(method("GET"))
        .and(path("/audio/a.wav"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("a.wav");

    let downloader = HttpDownloader::new(ONE_MB);
    let written = downloader
        .fetch(&format!("{}/audio/a.wav", server.uri()), &dest)
        .await
        .unwrap();

    assert_eq!(written, payload.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), payload);
}

#[tokio::test]
async fn non_success_status_is_an_error_and_leaves_no_file() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/audio/missing.wav"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("missing.wav");

    let downloader = HttpDownloader::new(ONE_MB);
    let err = downloader
        .fetch(&format!("{}/audio/missing.wav", server.uri()), &dest)
        .await
        .unwrap_err();

    match err {
        DownloadError::Status(code) => assert_eq!(code.as_u16(), 404),
        other => panic!("expected Status error, got {other:?}"),
    }
    assert!(!dest.exists());
}

#[tokio::test]
async fn oversized_body_trips_the_cap_and_removes_the_partial_file() {
    let server = MockServer::start().await;
    let payload = vec![0u8; 64 * 1024];

    Mock::given(method("GET"))
        .and(path("/audio/huge.wav"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("huge.wav");

    // Cap well below the payload size.
    let downloader = HttpDownloader::new(16 * 1024);
    let err = downloader
        .fetch(&format!("{}/audio/huge.wav", server.uri()), &dest)
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::TooLarge { .. }));
    assert!(!dest.exists());
}

#[tokio::test]
async fn unreachable_host_is_a_request_error() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("nope.wav");

    let downloader = HttpDownloader::new(ONE_MB);
    // Port 1 on loopback: connection refused immediately.
    let err = downloader
        .fetch("http://127.0.0.1:1/audio.wav", &dest)
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Request(_)));
    assert!(!dest.exists());
}
