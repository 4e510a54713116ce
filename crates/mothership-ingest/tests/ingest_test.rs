use std::sync::Arc;
use std::time::Duration;

use mothership_core::{ErrorKind, ErrorReport, ErrorSink, FilterDescriptor, MemoryStore, QueryStore};
use mothership_ingest::server::MAX_LINE_BYTES;
use mothership_ingest::{send_report, IngestPump, IngestServer, MessageSource};
use mothership_notebook::{HeadlessHost, Notebook, PageHost, RefreshQueue, RefreshReason};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn start_server() -> IngestServer {
    match IngestServer::start("127.0.0.1:0") {
        Ok(server) => server,
        Err(err) => panic!("start server: {err}"),
    }
}

#[tokio::test]
async fn reports_sent_by_client_are_readable() {
    let server = start_server();
    let report = ErrorReport::new(0, 22, Some(2), ErrorKind::Hardware, "Valve 2 exploded");
    if let Err(err) = send_report(server.local_addr(), &report).await {
        panic!("send: {err}");
    }

    let received = match server.read_next_message(Duration::from_secs(5)) {
        Some(report) => report,
        None => panic!("no report received"),
    };
    assert_eq!(received.rack, 0);
    assert_eq!(received.chassis, 22);
    assert_eq!(received.valve(), Some(2));
    assert_eq!(received.message, "Valve 2 exploded");
    assert_eq!(received.timestamp, None);
    assert!(server.read_next_message(Duration::from_millis(20)).is_none());
}

#[tokio::test]
async fn malformed_lines_are_skipped_without_dropping_the_connection() {
    let server = start_server();
    let mut stream = match TcpStream::connect(server.local_addr()).await {
        Ok(stream) => stream,
        Err(err) => panic!("connect: {err}"),
    };
    let payload = concat!(
        "this is not json\n",
        "\n",
        "{\"rack\":3,\"chassis\":1,\"message\":\"\"}\n",
        "{\"rack\":3,\"chassis\":1,\"kind\":\"software\",\"message\":\"watchdog reset\"}\n",
    );
    if let Err(err) = stream.write_all(payload.as_bytes()).await {
        panic!("write: {err}");
    }
    if let Err(err) = stream.flush().await {
        panic!("flush: {err}");
    }

    let received = match server.read_next_message(Duration::from_secs(5)) {
        Some(report) => report,
        None => panic!("valid report after garbage was not received"),
    };
    assert_eq!(received.kind, ErrorKind::Software);
    assert_eq!(received.message, "watchdog reset");

    let stats = server.stats();
    assert_eq!(stats.connections, 1);
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.rejected, 2);
}

#[tokio::test]
async fn unterminated_oversized_line_closes_the_connection() {
    let server = start_server();
    let mut stream = match TcpStream::connect(server.local_addr()).await {
        Ok(stream) => stream,
        Err(err) => panic!("connect: {err}"),
    };
    let payload = vec![b'x'; MAX_LINE_BYTES * 4];
    // The server may hang up mid-write; that is the outcome under test.
    let _ = stream.write_all(&payload).await;

    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf)).await;
    match read {
        Ok(Ok(0)) | Ok(Err(_)) => {}
        Ok(Ok(n)) => panic!("server sent {n} unexpected bytes"),
        Err(_) => panic!("connection still open after an oversized line"),
    }
    let stats = server.stats();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.accepted, 0);
    assert!(server.read_next_message(Duration::from_millis(20)).is_none());
}

#[tokio::test]
async fn ingested_reports_reach_the_notebook() {
    let server = Arc::new(start_server());
    let addr = server.local_addr();
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(RefreshQueue::new());
    let host = Arc::new(HeadlessHost::new());
    let notebook = Notebook::new(
        Arc::clone(&store) as Arc<dyn QueryStore>,
        host as Arc<dyn PageHost>,
    );
    if let Err(err) = notebook.open_initial() {
        panic!("open_initial: {err}");
    }

    let pump = match IngestPump::spawn(
        Arc::clone(&server) as Arc<dyn MessageSource>,
        Arc::clone(&store) as Arc<dyn ErrorSink>,
        Arc::clone(&queue),
        Duration::from_millis(20),
    ) {
        Ok(pump) => pump,
        Err(err) => panic!("spawn pump: {err}"),
    };

    for chassis in [1u32, 2] {
        let report = ErrorReport::new(7, chassis, None, ErrorKind::Hardware, "Chassis on fire");
        if let Err(err) = send_report(addr, &report).await {
            panic!("send: {err}");
        }
    }

    let mut seen = 0;
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while seen < 2 && std::time::Instant::now() < deadline {
        if let Some(batch) = queue.wait(Duration::from_millis(100)) {
            assert_eq!(batch.reason, RefreshReason::Ingest);
            let _ = notebook.refresh_all();
            seen = store.count(&FilterDescriptor::Rack { rack: 7 }).unwrap_or(0);
        }
    }
    let stats = pump.stop();
    assert_eq!(stats.persisted, 2);

    let _ = notebook.refresh_all();
    let lines = notebook.tab_at(0).map(|tab| tab.snapshot().lines);
    assert_eq!(
        lines.map(|lines| lines.len()),
        Some(2),
        "all tab should show both ingested errors"
    );
}
