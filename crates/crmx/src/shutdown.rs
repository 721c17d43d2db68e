//! 🛑 Ctrl-C as a [`CancellationToken`].
//!
//! Record loops check it between records, the paginator between pages, and the
//! API client races it against every nap and every read. A write already on the
//! wire is allowed to land; nothing new starts once the token is cancelled.

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// 📡 A token that gets cancelled on the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("🛑 Interrupted. Finishing the current record, then writing the summary.");
                trigger.cancel();
            }
            Err(err) => warn!("⚠️ Couldn't listen for Ctrl-C: {}", err),
        }
    });
    cancel
}
