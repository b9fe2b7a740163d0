//! Shared harness: boots the full application on an ephemeral port.

#![allow(dead_code, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use seatmap_gateway::app_state::{AppState, Background};
use seatmap_gateway::build_app;
use seatmap_gateway::config::{InventoryConfig, SeedConfig};
use seatmap_gateway::domain::{EventId, ManualClock};

/// A running server and the clock it reads.
pub struct TestServer {
    pub addr: std::net::SocketAddr,
    pub clock: ManualClock,
    pub background: Background,
}

impl TestServer {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn ws(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

/// Starts a server seeded with event 1: one row of five seats, ids 1 to 5.
pub async fn spawn_server() -> TestServer {
    let clock = ManualClock::default();
    let config = InventoryConfig {
        seed: Some(SeedConfig {
            event_id: EventId::new(1),
            rows: 1,
            seats_per_row: 5,
        }),
        sweep_interval: Duration::from_millis(50),
        ..InventoryConfig::default()
    };

    let Ok((state, background)) = AppState::bootstrap(&config, Arc::new(clock.clone())).await
    else {
        panic!("bootstrap failed");
    };
    let app = build_app(state, Duration::from_secs(5));

    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestServer {
        addr,
        clock,
        background,
    }
}
