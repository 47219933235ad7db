//! Background session task.

use super::{ConnectionStateMachine, SessionCmd, FAR_FUTURE};
use crate::transport::TransportEvent;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Drive `machine` until every client handle is gone.
///
/// Transport events are handled before commands so a response that already
/// arrived is never overtaken by a later API call. Timers fire when nothing
/// else is ready. After `close()` the loop keeps answering commands (with
/// `Closed`) until the command channel is dropped.
pub(crate) async fn run_session(
    mut machine: ConnectionStateMachine,
    mut cmd_rx: mpsc::Receiver<SessionCmd>,
    mut events_rx: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    mut unsub_rx: mpsc::UnboundedReceiver<(String, u64)>,
) {
    loop {
        let wake = machine
            .next_wakeup()
            .unwrap_or_else(|| Instant::now() + FAR_FUTURE);

        tokio::select! {
            biased;

            Some((epoch, event)) = events_rx.recv() => {
                machine.on_transport_event(epoch, event);
            }

            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => machine.handle_command(cmd),
                None => {
                    log::debug!("[doclink] All client handles dropped; shutting down session");
                    machine.close();
                    return;
                },
            },

            Some((room_id, callback_id)) = unsub_rx.recv() => {
                machine.handle_command(SessionCmd::Unsubscribe {
                    room_id,
                    callback_id,
                    reply: None,
                });
            }

            _ = tokio::time::sleep_until(wake) => {
                machine.on_tick(Instant::now());
            }
        }
    }
}
