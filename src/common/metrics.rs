// SPDX-License-Identifier: MIT

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

/// Lifecycle counters exposed on the metrics endpoint.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub cycles_run: AtomicU64,
    pub cycles_skipped: AtomicU64,
    pub proposals_created: AtomicU64,
    pub proposals_executed: AtomicU64,
    pub proposals_failed: AtomicU64,
    pub confirmations_recorded: AtomicU64,
}

pub async fn spawn_metrics_server(port: u16, stats: Arc<EngineStats>) -> Option<SocketAddr> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::warn!("Metrics server failed to bind: {}", e);
            return None;
        }
    };

    let local = listener.local_addr().ok();
    if let Some(addr) = local {
        tracing::info!("Metrics server listening on {}", addr);
    }

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let body = render_metrics(&stats);
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                }
                Err(e) => {
                    tracing::warn!("Metrics accept error: {}", e);
                    continue;
                }
            }
        }
    });

    local
}

fn render_metrics(stats: &Arc<EngineStats>) -> String {
    format!(
        concat!(
            "# TYPE allocation_cycles_run counter\nallocation_cycles_run {}\n",
            "# TYPE allocation_cycles_skipped counter\nallocation_cycles_skipped {}\n",
            "# TYPE proposals_created counter\nproposals_created {}\n",
            "# TYPE proposals_executed counter\nproposals_executed {}\n",
            "# TYPE proposals_failed counter\nproposals_failed {}\n",
            "# TYPE confirmations_recorded counter\nconfirmations_recorded {}\n"
        ),
        stats.cycles_run.load(Ordering::Relaxed),
        stats.cycles_skipped.load(Ordering::Relaxed),
        stats.proposals_created.load(Ordering::Relaxed),
        stats.proposals_executed.load(Ordering::Relaxed),
        stats.proposals_failed.load(Ordering::Relaxed),
        stats.confirmations_recorded.load(Ordering::Relaxed),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn metrics_endpoint_serves() {
        let stats = Arc::new(EngineStats::default());
        stats.proposals_created.store(3, Ordering::Relaxed);

        let addr = spawn_metrics_server(0, stats.clone())
            .await
            .expect("bind metrics");

        let body = reqwest::get(format!("http://{}", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(body.contains("proposals_created 3"));
    }
}
