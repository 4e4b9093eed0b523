use std::{net::UdpSocket, time::Duration};

use value_publisher::{PublisherBuilder, Shutdown};

fn collector() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("failed to bind collector");
    socket.set_read_timeout(Some(Duration::from_secs(5))).expect("failed to set read timeout");
    socket
}

#[test]
fn test_publish_to_loopback_collector() {
    let collector = collector();
    let addr = collector.local_addr().unwrap();

    let publisher = PublisherBuilder::default()
        .with_remote_address(addr.to_string())
        .unwrap_or_else(|e| panic!("failed to parse remote address: {:?}", e))
        .with_sample_interval(Duration::from_millis(5))
        .with_hostname_tag(false)
        .with_tag("test", "integration")
        .with_sample_limit(Some(3))
        .build()
        .unwrap_or_else(|e| panic!("failed to build publisher: {:?}", e));

    let report = publisher.run(&Shutdown::new()).expect("publisher failed");
    assert_eq!(report.samples_published, 3);
    assert_eq!(report.samples_dropped, 0);

    let mut buf = [0u8; 2048];
    let mut previous_ts = 0u64;
    for expected_value in ["0.200000", "0.400000", "0.600000"] {
        let n = collector.recv(&mut buf).expect("did not receive sample");
        let line = std::str::from_utf8(&buf[..n]).expect("sample is not valid UTF-8");
        assert!(!line.ends_with('\n'));

        let mut parts = line.split(' ');
        assert_eq!(parts.next(), Some("series,language=rust,test=integration"));
        assert_eq!(parts.next(), Some(format!("value={expected_value}").as_str()));

        let ts: u64 = parts.next().expect("missing timestamp").parse().expect("invalid timestamp");
        assert!(ts >= previous_ts);
        previous_ts = ts;
        assert_eq!(parts.next(), None);
    }
}

#[test]
fn test_shutdown_from_another_thread() {
    let collector = collector();
    let addr = collector.local_addr().unwrap();

    let publisher = PublisherBuilder::default()
        .with_remote_address(addr.to_string())
        .unwrap()
        .with_sample_interval(Duration::from_millis(20))
        .with_hostname_tag(false)
        .build()
        .unwrap();

    let shutdown = Shutdown::new();
    let handle = shutdown.clone();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(70));
        handle.request();
    });

    let report = publisher.run(&shutdown).expect("publisher failed");
    stopper.join().unwrap();

    assert!(report.samples_published >= 1);
    assert_eq!(report.samples_published, report.samples_generated);

    // Every sample that was published made it to the collector, and nothing more is sent after shutdown.
    let mut buf = [0u8; 2048];
    for _ in 0..report.samples_published {
        collector.recv(&mut buf).expect("did not receive sample");
    }
    collector.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
    assert!(collector.recv(&mut buf).is_err());
}
