// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::services::controller::engine::ControllerStats;
use crate::services::controller::keeper::KeeperHandle;
use crate::services::controller::status::StatusSnapshot;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Serves the read surface as JSON and cycle counters as Prometheus text.
///
/// Responses are rendered from the keeper's published snapshot, so a swap in
/// flight never delays a status read.
pub async fn spawn_metrics_server(
    bind: Option<&str>,
    port: u16,
    keeper: KeeperHandle,
) -> Option<SocketAddr> {
    let ip = match bind.map(str::parse::<IpAddr>) {
        Some(Ok(ip)) => ip,
        Some(Err(e)) => {
            tracing::warn!(target: "metrics", error = %e, "Invalid metrics bind address; using 127.0.0.1");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
        None => IpAddr::V4(Ipv4Addr::LOCALHOST),
    };
    let listener = match TcpListener::bind(SocketAddr::new(ip, port)).await {
        Ok(l) => l,
        Err(e) => {
            tracing::warn!(target: "metrics", "Metrics server failed to bind: {}", e);
            return None;
        }
    };

    let local = listener.local_addr().ok();
    if let Some(addr) = local {
        tracing::info!(target: "metrics", "Status server listening on {}", addr);
    }

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let keeper = keeper.clone();
                    tokio::spawn(async move { serve(socket, &keeper).await });
                }
                Err(e) => {
                    tracing::warn!(target: "metrics", "Metrics accept error: {}", e);
                    continue;
                }
            }
        }
    });

    local
}

async fn serve(mut socket: TcpStream, keeper: &KeeperHandle) {
    let mut buf = [0u8; 1024];
    let n = match tokio::time::timeout(REQUEST_READ_TIMEOUT, socket.read(&mut buf)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            tracing::debug!(target: "metrics", error = %e, "Status request read failed");
            return;
        }
        Err(_) => {
            tracing::debug!(target: "metrics", "Status request timed out");
            return;
        }
    };
    let req = String::from_utf8_lossy(&buf[..n]);
    let path = req
        .lines()
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .unwrap_or("/");
    let route = path.split_once('?').map(|(r, _)| r).unwrap_or(path);

    let snapshot = keeper.status();
    let (content_type, body) = match render_route(route, &snapshot) {
        Some(json) => ("application/json", json),
        None => ("text/plain", render_metrics(&keeper.stats(), &snapshot)),
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n{}",
        content_type,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

/// JSON payload for a read-surface route, `None` for the metrics page.
pub fn render_route(route: &str, snapshot: &StatusSnapshot) -> Option<String> {
    let body = match route.trim_end_matches('/') {
        "/status" => to_json(&snapshot.strategy),
        "/allocation" => to_json(&snapshot.allocation),
        "/circuit_breaker" => to_json(&snapshot.circuit_breaker),
        "/oracle" => to_json(&snapshot.oracle),
        "/rate_limit" => to_json(&snapshot.rate_limit),
        "/diagnostics" => to_json(&snapshot.diagnostics),
        "/attempts" => to_json(&snapshot.attempts),
        "/mode" => to_json(&serde_json::json!({
            "mode": snapshot.mode,
            "preRecoveryDailyLimit": snapshot.pre_recovery_daily_limit,
            "availableDepositLimit": snapshot.available_deposit_limit,
            "routers": snapshot.routers,
            "takenAt": snapshot.taken_at,
        })),
        _ => return None,
    };
    Some(body)
}

pub fn render_metrics(stats: &ControllerStats, snapshot: &StatusSnapshot) -> String {
    let load = |c: &std::sync::atomic::AtomicU64| c.load(Ordering::Relaxed);
    let status = &snapshot.strategy;
    let mut body = format!(
        concat!(
            "# TYPE keeper_cycles counter\nkeeper_cycles {}\n",
            "# TYPE keeper_cycles_executed counter\nkeeper_cycles_executed {}\n",
            "# TYPE keeper_cycles_failed counter\nkeeper_cycles_failed {}\n",
            "# TYPE keeper_cycles_skipped counter\nkeeper_cycles_skipped {}\n",
        ),
        load(&stats.cycles),
        load(&stats.executed),
        load(&stats.failed),
        load(&stats.skipped),
    );

    body.push_str("# TYPE keeper_skips counter\n");
    for (reason, counter) in [
        ("halted", &stats.skip_halted),
        ("circuit_breaker", &stats.skip_circuit_breaker),
        ("oracle", &stats.skip_oracle),
        ("interval", &stats.skip_interval),
        ("threshold", &stats.skip_threshold),
        ("rate_limit", &stats.skip_rate_limit),
        ("position_size", &stats.skip_position_size),
        ("busy", &stats.skip_busy),
    ] {
        body.push_str(&format!(
            "keeper_skips{{reason=\"{}\"}} {}\n",
            reason,
            load(counter)
        ));
    }

    body.push_str(&format!(
        concat!(
            "# TYPE rebalances_executed counter\nrebalances_executed {}\n",
            "# TYPE rebalances_failed counter\nrebalances_failed {}\n",
            "# TYPE swaps_executed counter\nswaps_executed {}\n",
            "# TYPE swaps_failed counter\nswaps_failed {}\n",
            "# TYPE circuit_breaker_tripped gauge\ncircuit_breaker_tripped {}\n",
            "# TYPE oracle_failure_mode gauge\noracle_failure_mode {}\n",
            "# TYPE allocation_bps gauge\nallocation_bps{{asset=\"A\"}} {}\nallocation_bps{{asset=\"B\"}} {}\n",
            "# TYPE daily_swap_used gauge\ndaily_swap_used {}\n",
            "# TYPE daily_swap_limit gauge\ndaily_swap_limit {}\n",
        ),
        status.rebalances_executed,
        status.rebalances_failed,
        status.swaps_executed,
        status.swaps_failed,
        u8::from(status.is_circuit_breaker_triggered),
        u8::from(status.is_in_oracle_failure_mode),
        status.asset_a_alloc_bps,
        status.asset_b_alloc_bps,
        status.daily_swap_used,
        status.daily_swap_limit,
    ));
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::controller::CycleOutcome;
    use crate::services::controller::mocks::{MockSetup, units};

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        stream
            .write_all(format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n").as_bytes())
            .await
            .expect("write");
        let mut out = String::new();
        stream.read_to_string(&mut out).await.expect("read");
        out
    }

    #[test]
    fn unknown_route_falls_through_to_metrics() {
        let setup = MockSetup::new();
        let ctrl = setup.controller();
        let snapshot = ctrl.status_snapshot();
        assert!(render_route("/", &snapshot).is_none());
        assert!(render_route("/status/", &snapshot).is_some());

        let page = render_metrics(&ctrl.stats(), &snapshot);
        assert!(page.contains("keeper_cycles 0"));
        assert!(page.contains("keeper_skips{reason=\"busy\"} 0"));
    }

    #[tokio::test]
    async fn serves_allocation_json() {
        let setup = MockSetup::new();
        let mut ctrl = setup.controller();
        ctrl.sync_holdings(units(3), units(1));
        let keeper = KeeperHandle::new(ctrl);

        let addr = spawn_metrics_server(Some("127.0.0.1"), 0, keeper)
            .await
            .expect("bind");
        let response = get(addr, "/allocation").await;
        let body = response.split("\r\n\r\n").nth(1).expect("body");
        let json: serde_json::Value = serde_json::from_str(body).expect("json");
        assert_eq!(json["thirdBalance"], serde_json::json!("0x0"));
        assert_eq!(json["assetAPercentBps"], serde_json::json!(7_500));
        assert_eq!(json["assetBPercentBps"], serde_json::json!(2_500));
    }

    #[tokio::test]
    async fn status_reads_do_not_wait_for_a_swap_in_flight() {
        let setup = MockSetup::new();
        setup.router.set_swap_delay(Duration::from_secs(3));
        let mut ctrl = setup.controller();
        ctrl.sync_holdings(units(6), units(4));
        let keeper = KeeperHandle::new(ctrl);
        let addr = spawn_metrics_server(Some("127.0.0.1"), 0, keeper.clone())
            .await
            .expect("bind");

        let cycle = tokio::spawn({
            let keeper = keeper.clone();
            async move { keeper.trigger().await }
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = std::time::Instant::now();
        let response = get(addr, "/status").await;
        assert!(
            started.elapsed() < Duration::from_secs(1),
            "status read took {:?}",
            started.elapsed()
        );
        let body = response.split("\r\n\r\n").nth(1).expect("body");
        let json: serde_json::Value = serde_json::from_str(body).expect("json");
        assert_eq!(json["rebalancesExecuted"], serde_json::json!(0));
        assert!(!cycle.is_finished());

        let outcome = cycle.await.expect("cycle task");
        assert!(matches!(outcome, CycleOutcome::Executed(_)));
        assert_eq!(keeper.status().strategy.rebalances_executed, 1);
    }
}
