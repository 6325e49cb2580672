use adcbridge::error::{MalformedFrameError, TransportError};
use adcbridge::hal::drivers::{StreamHandle, StreamOpener, StreamTransport, TcpOpener};
use adcbridge::hal::{Transport, TransportHandle, TransportKind};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_test::io::{Builder, Mock};

const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Hands out one scripted stream
struct MockOpener {
    stream: Mutex<Option<Mock>>,
}

#[async_trait]
impl StreamOpener for MockOpener {
    type Stream = Mock;

    fn endpoint(&self) -> String {
        "mock-serial".to_string()
    }

    async fn open(&self) -> std::io::Result<Mock> {
        self.stream
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "already opened"))
    }
}

#[tokio::test]
async fn test_frames_split_across_reads_are_reassembled() {
    let mock = Builder::new()
        .read(b"{\"timestamp\":1,\"channels\":{\"0\":{\"raw\":10,\"voltage\":0.01}}}\n{\"timestamp\":2,\"channels\":{\"1\":{\"raw\":20,\"voltage\":0.02}}}\n{\"timestamp\":3,")
        .read(b"\"channels\":{\"2\":{\"raw\":30,\"voltage\":0.03}}}\n")
        .build();
    let mut handle = StreamHandle::new(mock, READ_TIMEOUT);

    let first = handle.fetch_one().await.unwrap();
    let second = handle.fetch_one().await.unwrap();
    let third = handle.fetch_one().await.unwrap();

    assert_eq!(first.device_timestamp, Some(1.0));
    assert_eq!(first.channel(0).unwrap().raw, 10);
    assert_eq!(second.device_timestamp, Some(2.0));
    assert!(second.channel(0).is_none());
    assert_eq!(third.channel(2).unwrap().voltage, 0.03);

    // End of stream
    assert!(matches!(handle.fetch_one().await, Err(TransportError::Closed)));
    assert!(!handle.is_open());
}

#[tokio::test]
async fn test_noise_is_skipped_and_bad_frames_surface_as_malformed() {
    let mock = Builder::new()
        .read(b"ets Jun  8 2016 00:22:57\r\n{not json}\n\n{\"timestamp\":1}\n{\"channels\":{\"3\":{\"raw\":\"40\",\"voltage\":\"0.04\"}}}\n")
        .build();
    let mut handle = StreamHandle::new(mock, READ_TIMEOUT);

    // Boot banner is not a frame and is dropped; the two bad frames come out in order
    assert!(matches!(
        handle.fetch_one().await,
        Err(TransportError::Malformed(MalformedFrameError::InvalidJson(_)))
    ));
    assert_eq!(handle.buffered(), 2);
    assert!(matches!(
        handle.try_next(),
        Some(Err(TransportError::Malformed(MalformedFrameError::MissingChannels)))
    ));

    let sample = handle.try_next().unwrap().unwrap();
    assert_eq!(sample.channel(3).unwrap().raw, 40);
    assert_eq!(sample.channel_count(), 1);
    assert!(handle.try_next().is_none());

    assert!(matches!(handle.fetch_one().await, Err(TransportError::Closed)));
}

#[tokio::test]
async fn test_fast_device_does_not_build_a_backlog() {
    let (mut device, host) = tokio::io::duplex(64 * 1024);
    let mut handle = StreamHandle::new(host, READ_TIMEOUT);

    let mut next_id = 0u64;
    for _ in 0..200 {
        // Two frames per pacing tick
        for _ in 0..2 {
            device.write_all(frame(next_id).as_bytes()).await.unwrap();
            next_id += 1;
        }

        let mut newest = handle.fetch_one().await.unwrap().device_timestamp;
        while let Some(outcome) = handle.try_next() {
            newest = outcome.unwrap().device_timestamp;
        }

        assert_eq!(newest, Some((next_id - 1) as f64));
        assert_eq!(handle.buffered(), 0);
    }
}

fn frame(id: u64) -> String {
    format!(
        "{{\"timestamp\":{},\"channels\":{{\"0\":{{\"raw\":{},\"voltage\":0.5}}}}}}\n",
        id, id
    )
}

#[tokio::test]
async fn test_partial_read_is_idle_not_error() {
    let mock = Builder::new().read(b"{\"channels\":{\"0\"").build();
    let mut handle = StreamHandle::new(mock, READ_TIMEOUT);

    let result = handle.fetch_one().await;
    assert!(matches!(result, Err(TransportError::Idle)));
    assert!(!result.unwrap_err().is_counted());

    assert!(matches!(handle.fetch_one().await, Err(TransportError::Closed)));
}

#[tokio::test(start_paused = true)]
async fn test_connect_waits_for_settle_delay() {
    let opener = MockOpener {
        stream: Mutex::new(Some(
            Builder::new()
                .read(b"{\"channels\":{\"1\":{\"raw\":5,\"voltage\":0.005}}}\n")
                .build(),
        )),
    };
    let transport = StreamTransport::new(
        opener,
        TransportKind::Serial,
        Duration::from_secs(2),
        READ_TIMEOUT,
    );
    assert_eq!(transport.endpoint(), "mock-serial");

    let start = tokio::time::Instant::now();
    let mut handle = transport.connect().await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(2));

    let sample = handle.fetch_one().await.unwrap();
    assert_eq!(sample.channel(1).unwrap().raw, 5);
    assert!(matches!(handle.fetch_one().await, Err(TransportError::Closed)));

    // A second open fails and surfaces as a connect error
    assert!(matches!(transport.connect().await, Err(TransportError::Connect(_))));
}

#[tokio::test]
async fn test_stream_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let device = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        for i in 0..3 {
            let line = format!(
                "{{\"timestamp\":{},\"channels\":{{\"0\":{{\"raw\":{},\"voltage\":0.5}}}}}}\n",
                i,
                100 + i
            );
            socket.write_all(line.as_bytes()).await.unwrap();
        }
        socket.shutdown().await.unwrap();
    });

    let transport = StreamTransport::new(
        TcpOpener::new(addr.to_string()),
        TransportKind::Serial,
        Duration::ZERO,
        READ_TIMEOUT,
    );
    let mut handle = transport.connect().await.unwrap();

    let mut raws = Vec::new();
    loop {
        match handle.fetch_one().await {
            Ok(sample) => raws.push(sample.channel(0).unwrap().raw),
            Err(TransportError::Idle) => continue,
            Err(TransportError::Closed) => break,
            Err(e) => panic!("unexpected error {}", e),
        }
    }
    device.await.unwrap();

    assert_eq!(raws, vec![100, 101, 102]);
}

#[tokio::test]
async fn test_tcp_connect_refused_is_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = StreamTransport::new(
        TcpOpener::new(addr.to_string()),
        TransportKind::Serial,
        Duration::ZERO,
        READ_TIMEOUT,
    );
    let err = transport.connect().await.err().unwrap();
    assert!(matches!(err, TransportError::Connect(_)));
    assert!(!err.is_transient());
}
