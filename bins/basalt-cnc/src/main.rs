use std::time::{SystemTime, UNIX_EPOCH};

use basalt_client::ContextConfig;
use basalt_driver::CncFile;
use basalt_icc::ManyToOneRingBuffer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("INFO")),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| ContextConfig::load("config/basalt.toml")
            .map(|c| c.cnc_file_name)
            .unwrap_or_else(|_| "/dev/shm/basalt/cnc.dat".to_string()));

    let cnc = CncFile::map_existing(&path)?;

    info!("CNC: {path}");
    info!(
        "  to-driver:        {len} bytes",
        len = cnc.to_driver_buffer()?.capacity()
    );
    info!(
        "  to-clients:       {len} bytes",
        len = cnc.to_clients_buffer()?.capacity()
    );
    info!(
        "  counter metadata: {len} bytes",
        len = cnc.counter_metadata_buffer()?.capacity()
    );
    info!(
        "  counter values:   {len} bytes",
        len = cnc.counter_values_buffer()?.capacity()
    );
    info!(
        "  error log:        {len} bytes",
        len = cnc.error_log_buffer()?.capacity()
    );
    info!(
        "  liveness timeout: {ns} ns",
        ns = cnc.client_liveness_timeout_ns()?
    );

    let ring = ManyToOneRingBuffer::wrap(cnc.to_driver_buffer()?)?;
    let heartbeat_ms = ring.consumer_heartbeat_time();
    if heartbeat_ms > 0 {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        info!(
            "  driver heartbeat: {age} ms ago (head={head}, tail={tail})",
            age = now_ms - heartbeat_ms,
            head = ring.head_position(),
            tail = ring.tail_position()
        );
    } else {
        warn!("  driver heartbeat: never recorded");
    }

    Ok(())
}
