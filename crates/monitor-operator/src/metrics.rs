use std::sync::LazyLock;

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, TextEncoder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

// Registered with the default prometheus registry on first use.

static RECONCILIATIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "monitor_operator_reconciliations_total",
            "Total number of MonitorStack reconciliations",
        ),
        &["result"],
    )
    .expect("metric can be created");
    prometheus::register(Box::new(counter.clone())).expect("metric can be registered");
    counter
});

static RECONCILE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    let hist = Histogram::with_opts(HistogramOpts::new(
        "monitor_operator_reconciliation_duration_seconds",
        "Duration of MonitorStack reconciliation in seconds",
    ))
    .expect("metric can be created");
    prometheus::register(Box::new(hist.clone())).expect("metric can be registered");
    hist
});

/// Record a completed reconciliation.
pub fn record_reconciliation(result: &str) {
    RECONCILIATIONS.with_label_values(&[result]).inc();
}

pub fn observe_reconcile_duration(duration_secs: f64) {
    RECONCILE_DURATION.observe(duration_secs);
}

/// Encode all registered metrics as Prometheus text format.
fn encode_metrics() -> Result<Vec<u8>, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {e}"))?;
    Ok(buffer)
}

/// Pick the response for a raw HTTP request.
fn route(request: &str) -> (&'static str, &'static str, Vec<u8>) {
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    match path {
        "/metrics" => match encode_metrics() {
            Ok(data) => ("200 OK", "text/plain; version=0.0.4; charset=utf-8", data),
            Err(e) => ("500 Internal Server Error", "text/plain", e.into_bytes()),
        },
        "/healthz" | "/readyz" => ("200 OK", "text/plain", b"ok".to_vec()),
        _ => ("404 Not Found", "text/plain", b"not found".to_vec()),
    }
}

async fn handle(mut stream: TcpStream) {
    let mut buf = vec![0u8; 4096];
    let n = match stream.read(&mut buf).await {
        Ok(n) => n,
        Err(e) => {
            debug!("Failed to read metrics request: {e}");
            return;
        }
    };

    let (status, content_type, body) = route(&String::from_utf8_lossy(&buf[..n]));
    let header = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes()).await;
    let _ = stream.write_all(&body).await;
}

/// Start the metrics and health HTTP server.
///
/// Serves:
/// - `GET /metrics`: Prometheus metrics
/// - `GET /healthz`: liveness probe (always 200)
/// - `GET /readyz`: readiness probe (always 200)
pub async fn serve(addr: String) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("Metrics server listening on {addr}");

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::spawn(handle(stream));
            }
            Err(e) => {
                error!("Failed to accept metrics connection: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_reconciliation() {
        record_reconciliation("success");
        record_reconciliation("retry");

        let val = RECONCILIATIONS.with_label_values(&["success"]).get();
        assert!(val >= 1);
    }

    #[test]
    fn test_observe_duration() {
        observe_reconcile_duration(0.5);
        observe_reconcile_duration(1.2);
        assert!(RECONCILE_DURATION.get_sample_count() >= 2);
    }

    #[test]
    fn test_routes() {
        record_reconciliation("success");
        let (status, _, body) = route("GET /metrics HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(status, "200 OK");
        assert!(String::from_utf8(body)
            .unwrap()
            .contains("monitor_operator_reconciliations_total"));

        assert_eq!(route("GET /healthz HTTP/1.1\r\n\r\n").0, "200 OK");
        assert_eq!(route("GET /readyz HTTP/1.1\r\n\r\n").0, "200 OK");
        assert_eq!(route("GET /nope HTTP/1.1\r\n\r\n").0, "404 Not Found");
    }

    #[tokio::test]
    async fn test_serve_answers_health_check() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        tokio::spawn(serve(addr.to_string()));

        let mut attempts = 0;
        let mut stream = loop {
            match TcpStream::connect(addr).await {
                Ok(stream) => break stream,
                Err(_) if attempts < 100 => {
                    attempts += 1;
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                }
                Err(e) => panic!("metrics server never came up: {e}"),
            }
        };
        stream
            .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with("ok"));
    }
}
