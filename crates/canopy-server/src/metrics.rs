use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use canopy_core::engine::MoveError;

#[derive(Debug, Default, Clone, Copy)]
struct OperationStats {
    count: u64,
    total_micros: u64,
}

#[derive(Debug, Default)]
pub struct Metrics {
    request_total: AtomicU64,
    request_success: AtomicU64,
    request_error: AtomicU64,
    move_rejected_source: AtomicU64,
    move_rejected_destination: AtomicU64,
    move_rejected_circular: AtomicU64,
    operations: Mutex<BTreeMap<&'static str, OperationStats>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.request_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.request_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.request_error.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_total(&self) -> u64 {
        self.request_total.load(Ordering::Relaxed)
    }

    pub fn request_success(&self) -> u64 {
        self.request_success.load(Ordering::Relaxed)
    }

    pub fn request_error(&self) -> u64 {
        self.request_error.load(Ordering::Relaxed)
    }

    pub fn record_operation(&self, name: &'static str, elapsed: Duration) {
        // A poisoned lock only loses a sample.
        if let Ok(mut operations) = self.operations.lock() {
            let stats = operations.entry(name).or_default();
            stats.count += 1;
            stats.total_micros += u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        }
    }

    pub fn operation_count(&self, name: &str) -> u64 {
        self.operations
            .lock()
            .ok()
            .and_then(|ops| ops.get(name).map(|s| s.count))
            .unwrap_or(0)
    }

    pub fn record_move_rejected(&self, err: &MoveError) {
        let counter = match err {
            MoveError::NotOwnerOfSource(_) => &self.move_rejected_source,
            MoveError::NoCreateInDestination(_) => &self.move_rejected_destination,
            MoveError::CircularMove(_) => &self.move_rejected_circular,
            MoveError::Engine(_) => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn move_rejected(&self, reason: &str) -> u64 {
        let counter = match reason {
            "not_owner_of_source" => &self.move_rejected_source,
            "no_create_in_destination" => &self.move_rejected_destination,
            "circular_move" => &self.move_rejected_circular,
            _ => return 0,
        };
        counter.load(Ordering::Relaxed)
    }

    pub fn render_prometheus(&self) -> String {
        let mut output = String::new();
        output.push_str("# HELP canopy_requests_total Total number of requests.\n");
        output.push_str("# TYPE canopy_requests_total counter\n");
        output.push_str(&format!("canopy_requests_total {}\n", self.request_total()));
        output.push_str("# HELP canopy_requests_success_total Total successful requests.\n");
        output.push_str("# TYPE canopy_requests_success_total counter\n");
        output.push_str(&format!(
            "canopy_requests_success_total {}\n",
            self.request_success()
        ));
        output.push_str("# HELP canopy_requests_error_total Total failed requests.\n");
        output.push_str("# TYPE canopy_requests_error_total counter\n");
        output.push_str(&format!(
            "canopy_requests_error_total {}\n",
            self.request_error()
        ));

        output.push_str("# HELP canopy_move_rejected_total Rejected moves by reason.\n");
        output.push_str("# TYPE canopy_move_rejected_total counter\n");
        for reason in [
            "not_owner_of_source",
            "no_create_in_destination",
            "circular_move",
        ] {
            output.push_str(&format!(
                "canopy_move_rejected_total{{reason=\"{reason}\"}} {}\n",
                self.move_rejected(reason)
            ));
        }

        let operations = self
            .operations
            .lock()
            .map(|ops| ops.clone())
            .unwrap_or_default();
        output.push_str("# HELP canopy_operation_requests_total Requests per operation.\n");
        output.push_str("# TYPE canopy_operation_requests_total counter\n");
        for (name, stats) in &operations {
            output.push_str(&format!(
                "canopy_operation_requests_total{{operation=\"{name}\"}} {}\n",
                stats.count
            ));
        }
        output.push_str(
            "# HELP canopy_operation_duration_seconds_total Cumulative time per operation.\n",
        );
        output.push_str("# TYPE canopy_operation_duration_seconds_total counter\n");
        for (name, stats) in &operations {
            output.push_str(&format!(
                "canopy_operation_duration_seconds_total{{operation=\"{name}\"}} {:.6}\n",
                stats.total_micros as f64 / 1_000_000.0
            ));
        }
        output
    }
}

pub async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        metrics.render_prometheus(),
    )
}
