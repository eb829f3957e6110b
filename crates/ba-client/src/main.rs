//! Headless composition-root binary: boots every subsystem and drives the
//! per-frame pump at a fixed rate until interrupted. A real embedder
//! (desktop shell, game engine plugin) links `ba-client` as a library and
//! supplies its own [`ba_gpu_upload::GpuDevice`] instead of running this
//! binary directly — there is no rendering API here (out of scope), only
//! the subsystem wiring and the update loop around it.

use std::sync::Arc;
use std::time::Duration;

use ba_client::{Client, ClientOptions};
use ba_gpu_upload::{GpuDevice, NullGpuDevice};
use tracing::info;

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[tokio::main]
async fn main() {
    ba_tracing::init();

    let device: Arc<dyn GpuDevice> = Arc::new(NullGpuDevice::new());
    let mut client = Client::new(device, ClientOptions::default());

    info!("client running, press ctrl-c to stop");

    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                client.update();
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    client.shutdown(Duration::from_secs(5));
}
