use adcbridge::error::{MalformedFrameError, TransportError};
use adcbridge::hal::drivers::HttpTransport;
use adcbridge::hal::{Transport, TransportHandle, TransportKind};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve `body` as a JSON response to every request; returns `host:port`
async fn serve(body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr.to_string()
}

#[tokio::test]
async fn test_poll_parses_device_payload() {
    let host = serve(r#"{"timestamp": 4242, "channels": {"0": {"raw": 2048, "voltage": 1.65}, "2": {"raw": 0, "voltage": 0.0}}}"#).await;
    let transport = HttpTransport::new(&host, Duration::from_secs(2)).unwrap();
    assert_eq!(transport.kind(), TransportKind::Http);
    assert_eq!(transport.endpoint(), format!("http://{}/data", host));

    let mut handle = transport.connect().await.unwrap();
    let sample = handle.fetch_one().await.unwrap();

    assert_eq!(sample.device_timestamp, Some(4242.0));
    assert_eq!(sample.channel(0).unwrap().raw, 2048);
    assert_eq!(sample.channel(2).unwrap().voltage, 0.0);
    assert!(sample.channel(1).is_none());

    handle.close().await.unwrap();
    assert!(!handle.is_open());
    assert!(matches!(handle.fetch_one().await, Err(TransportError::Closed)));
}

#[tokio::test]
async fn test_payload_without_channels_is_malformed() {
    let host = serve(r#"{"status": "booting"}"#).await;
    let transport = HttpTransport::new(&host, Duration::from_secs(2)).unwrap();

    let mut handle = transport.connect().await.unwrap();
    let err = handle.fetch_one().await.unwrap_err();

    assert!(matches!(
        err,
        TransportError::Malformed(MalformedFrameError::MissingChannels)
    ));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_unreachable_host_fails_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = listener.local_addr().unwrap().to_string();
    drop(listener);

    let transport = HttpTransport::new(&host, Duration::from_millis(500)).unwrap();
    assert!(matches!(transport.connect().await, Err(TransportError::Connect(_))));
}
