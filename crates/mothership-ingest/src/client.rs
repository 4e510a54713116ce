//! Client side of the ingest wire format.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use mothership_core::ErrorReport;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::IngestError;

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Encode `report` as one wire line.
pub fn encode_report(report: &ErrorReport) -> Result<String, IngestError> {
    report.validate().map_err(IngestError::InvalidReport)?;
    let mut line = serde_json::to_string(report)?;
    line.push('\n');
    Ok(line)
}

/// Send reports over one connection.
pub async fn send_reports(addr: SocketAddr, reports: &[ErrorReport]) -> Result<(), IngestError> {
    let mut payload = String::new();
    for report in reports {
        payload.push_str(&encode_report(report)?);
    }
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|source| IngestError::Connect { addr, source })?;
    stream.write_all(payload.as_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await?;
    tracing::debug!(addr = %addr, count = reports.len(), "reports sent");
    Ok(())
}

pub async fn send_report(addr: SocketAddr, report: &ErrorReport) -> Result<(), IngestError> {
    send_reports(addr, std::slice::from_ref(report)).await
}

/// Resolve `addr` and send one report from synchronous code.
pub fn send_report_blocking(
    addr: &str,
    report: &ErrorReport,
    timeout: Duration,
) -> Result<(), IngestError> {
    let timeout = if timeout.is_zero() {
        DEFAULT_SEND_TIMEOUT
    } else {
        timeout
    };
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let target = resolve(addr).await?;
        with_timeout(timeout, "send report", send_report(target, report)).await
    })
}

async fn resolve(addr: &str) -> Result<SocketAddr, IngestError> {
    let mut candidates = tokio::net::lookup_host(addr)
        .await
        .map_err(|_| IngestError::Resolve(addr.to_string()))?;
    candidates
        .next()
        .ok_or_else(|| IngestError::Resolve(addr.to_string()))
}

async fn with_timeout<T>(
    timeout: Duration,
    label: &str,
    future: impl Future<Output = Result<T, IngestError>>,
) -> Result<T, IngestError> {
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(IngestError::Timeout(label.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mothership_core::ErrorKind;

    #[test]
    fn encode_report_is_one_json_line() {
        let report = ErrorReport::new(1, 2, Some(3), ErrorKind::Software, "stuck");
        let line = match encode_report(&report) {
            Ok(line) => line,
            Err(err) => panic!("encode: {err}"),
        };
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        let decoded: ErrorReport = match serde_json::from_str(line.trim_end()) {
            Ok(report) => report,
            Err(err) => panic!("decode: {err}"),
        };
        assert_eq!(decoded, report);
    }

    #[test]
    fn encode_rejects_blank_message() {
        let report = ErrorReport::new(1, 2, None, ErrorKind::Hardware, " ");
        assert!(matches!(
            encode_report(&report),
            Err(IngestError::InvalidReport(_))
        ));
    }

    #[test]
    fn blocking_send_to_closed_port_fails() {
        let report = ErrorReport::new(1, 2, None, ErrorKind::Hardware, "x");
        let listener = match std::net::TcpListener::bind("127.0.0.1:0") {
            Ok(listener) => listener,
            Err(err) => panic!("bind: {err}"),
        };
        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(err) => panic!("local_addr: {err}"),
        };
        drop(listener);
        let result = send_report_blocking(&addr.to_string(), &report, Duration::from_secs(2));
        assert!(matches!(result, Err(IngestError::Connect { .. })));
    }
}
