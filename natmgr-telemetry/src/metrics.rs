use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Port on which the Prometheus scrape endpoint listens.
const METRICS_PORT: u16 = 9000;

/// Initializes metrics with an automatic HTTP server on port 9000.
///
/// Installs a global metrics recorder and starts an HTTP server listening on
/// `[::]:9000/metrics` so Prometheus can scrape directly from a fixed port.
/// Every metric is tagged with the provided service name through a global
/// label.
///
/// Must be called before the async runtime starts; the exporter runs on its
/// own background thread.
pub fn init_metrics(service_name: &str) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::new(
            IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            METRICS_PORT,
        ))
        .add_global_label("service", service_name)
        .install()?;

    Ok(())
}
