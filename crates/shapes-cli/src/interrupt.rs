use std::thread;

use anyhow::Context;
use log::{info, warn};
use shapes_training::CancelToken;
use tokio::{runtime, signal};

/// Cancels `token` on every Ctrl-C until the process exits.
///
/// The listener runs on its own thread with a single-threaded runtime, so the
/// training loops stay synchronous and only ever see the token.
pub fn cancel_on_ctrl_c(token: CancelToken) -> anyhow::Result<()> {
    let runtime = runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build the signal runtime")?;
    thread::Builder::new()
        .name("ctrl-c".to_owned())
        .spawn(move || {
            runtime.block_on(async move {
                loop {
                    if let Err(e) = signal::ctrl_c().await {
                        warn!("cannot listen for Ctrl-C: {e}");
                        break;
                    }
                    info!("received interrupt");
                    token.cancel();
                }
            });
        })
        .context("Failed to spawn the interrupt listener")?;
    Ok(())
}
