//! Prometheus metrics.
//!
//! Exposed on the `/metrics` endpoint (see [`crate::http`]). Command
//! and ping latencies use histograms; the Rust prometheus crate has no
//! summary type.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

const NAMESPACE: &str = "ferrumd";

lazy_static! {
    /// Registry backing the exposition endpoint.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Client commands processed.
    pub static ref CLIENT_COMMANDS: IntCounter = IntCounter::with_opts(
        Opts::new("client_commands", "Number of client commands processed")
            .namespace(NAMESPACE)
    )
    .expect("client_commands");

    /// Client messages exchanged (one per fanout recipient).
    pub static ref CLIENT_MESSAGES: IntCounter = IntCounter::with_opts(
        Opts::new("client_messages", "Number of client messages exchanged")
            .namespace(NAMESPACE)
    )
    .expect("client_messages");

    /// Active connections, registered or not.
    pub static ref SERVER_CONNECTIONS: IntGauge = IntGauge::with_opts(
        Opts::new("server_connections", "Number of active connections to the server")
            .namespace(NAMESPACE)
    )
    .expect("server_connections");

    /// Registered clients.
    pub static ref SERVER_REGISTERED: IntGauge = IntGauge::with_opts(
        Opts::new("server_registered", "Number of registered clients connected")
            .namespace(NAMESPACE)
    )
    .expect("server_registered");

    /// Active channels.
    pub static ref SERVER_CHANNELS: IntGauge = IntGauge::with_opts(
        Opts::new("server_channels", "Number of active channels")
            .namespace(NAMESPACE)
    )
    .expect("server_channels");

    /// Clients by transport security.
    pub static ref SERVER_CLIENTS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("server_clients", "Number of clients connected (by secure/insecure)")
            .namespace(NAMESPACE),
        &["secure"]
    )
    .expect("server_clients");

    /// Command processing time by command.
    pub static ref COMMAND_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "client_command_duration_seconds",
            "Client command processing time in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        &["command"]
    )
    .expect("client_command_duration_seconds");

    /// Observed PING round-trip latency.
    pub static ref PING_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "client_ping_latency_seconds",
            "Client ping latency in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0])
    )
    .expect("client_ping_latency_seconds");
}

/// Register every metric with [`REGISTRY`]. Called once at startup.
pub fn init() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(CLIENT_COMMANDS.clone()),
        Box::new(CLIENT_MESSAGES.clone()),
        Box::new(SERVER_CONNECTIONS.clone()),
        Box::new(SERVER_REGISTERED.clone()),
        Box::new(SERVER_CHANNELS.clone()),
        Box::new(SERVER_CLIENTS.clone()),
        Box::new(COMMAND_DURATION.clone()),
        Box::new(PING_LATENCY.clone()),
    ];
    for collector in collectors {
        // double registration only happens in tests; ignore it
        let _ = REGISTRY.register(collector);
    }
}

/// Encode the registry in the text exposition format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&REGISTRY.gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_and_gather() {
        init();
        CLIENT_COMMANDS.inc();
        SERVER_CLIENTS.with_label_values(&["true"]).inc();
        let text = gather();
        assert!(text.contains("ferrumd_client_commands"));
        assert!(text.contains("ferrumd_server_clients"));
    }
}
