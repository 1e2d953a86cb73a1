//! Readiness probing of the wallet API endpoint.
//!
//! The probe repeatedly attempts a bare TCP connect at a fixed interval
//! until either the stop predicate reports that supervision has moved
//! past `Started` (halt silently) or a connect succeeds (report once).
//! The port is usually unknown when polling begins; ticks no-op until it
//! arrives on the watch channel.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::launcher::Api;

/// Poll `host:port` until it accepts a connection.
///
/// Returns `Some(api)` on the first successful connect and `None` when
/// `should_stop` became true first. Connection failures are transient by
/// definition here; they are logged at debug and retried on the next
/// tick. Each attempt is bounded by the poll interval so a hung connect
/// is abandoned before the next one starts.
pub(crate) async fn wait_for_api<F>(
    host: String,
    port_rx: watch::Receiver<Option<u16>>,
    interval: Duration,
    should_stop: F,
) -> Option<Api>
where
    F: Fn() -> bool,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if should_stop() {
            debug!("supervision moved past started, halting readiness probe");
            return None;
        }

        let Some(port) = *port_rx.borrow() else {
            // Port not advertised yet; keep ticking.
            continue;
        };

        match tokio::time::timeout(interval, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(stream)) => {
                drop(stream);
                debug!(port, "wallet API accepted a connection");
                return Some(Api::new(&host, port));
            }
            Ok(Err(err)) => {
                debug!(port, error = %err, "wallet API not ready yet");
            }
            Err(_) => {
                debug!(port, "connect attempt timed out");
            }
        }
    }
}
