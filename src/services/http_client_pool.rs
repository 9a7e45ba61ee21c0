use reqwest::Client;
use std::time::Duration;

/// Builds the keep-alive client shared by both processor clients. Per-request
/// timeouts are applied by the callers.
pub fn build_http_client(max_idle_per_host: usize) -> reqwest::Result<Client> {
    Client::builder()
        .pool_max_idle_per_host(max_idle_per_host) // Mantém conexões vivas
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .build()
}
