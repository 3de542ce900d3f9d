pub mod config;
pub mod dispatch;
pub mod event;
pub mod follow;
pub mod protocol;
pub mod refs;
pub mod transport;
pub mod view_state;

use crate::protocol::{ProtocolError, StateEnvelope, reader_loop, writer_loop};
use crate::view_state::{ViewState, should_resync_for_error};
use serde_json::Value;
use slint::ComponentHandle;
use std::io;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub use crate::config::HostConfig;
pub use crate::dispatch::{
    EventChannel, ExtraValue, FormBinding, FormElement, FormHandler, ParamBinding, ResetPolicy,
};
pub use crate::event::{
    ChatCommand, EventDescriptor, Handler, HandlerName, StatePath, UploadedFile,
};
pub use crate::follow::{FollowController, FollowState, ScrollMetrics, ScrollRegion};
pub use crate::refs::{ElementHandle, RefScope};
pub use crate::transport::{ChannelTransport, ConnectionError, ConnectionLog, Transport};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("ui platform error: {0}")]
    Platform(#[from] slint::PlatformError),
}

/// Window-specific glue supplied by the host binary.
pub trait HostBindings: 'static {
    type Ui: ComponentHandle + 'static;

    fn new_ui() -> Result<Self::Ui, slint::PlatformError>;

    /// Register live element handles and wire UI callbacks to `channel`.
    /// Runs once on the UI thread before the event loop starts.
    fn install(ui: &Self::Ui, channel: EventChannel);

    fn apply_render(ui: &Self::Ui, vm: &Value) -> Result<(), String>;

    fn show_connection_errors(ui: &Self::Ui, errors: &[ConnectionError]);
}

pub fn run<B: HostBindings>(config: HostConfig) -> Result<(), HostError> {
    let ui = B::new_ui()?;
    let ui_weak = ui.as_weak();
    let (tx, rx) = mpsc::sync_channel(config.outbound_queue_cap);

    let banner_weak = ui.as_weak();
    let errors = ConnectionLog::with_listener(move |errors| {
        let _ = banner_weak.upgrade_in_event_loop(move |ui| {
            B::show_connection_errors(&ui, &errors);
        });
    });

    let transport = Arc::new(ChannelTransport::new(
        tx,
        config.sid.clone(),
        config.outbound_queue_cap,
        errors.clone(),
    ));
    let channel = EventChannel::new(
        transport.clone(),
        RefScope::new(),
        config.state_path.clone(),
    );
    B::install(&ui, channel);

    let writer_errors = errors.clone();
    let writer_handle = thread::spawn(move || {
        let result = writer_loop(rx, io::stdout().lock());
        if let Err(err) = &result {
            writer_errors.record(ConnectionError::WriterStopped(err.to_string()));
        }
        result
    });

    transport.send_ready();
    info!(sid = %config.sid, state = config.state_path.as_str(), "chat host ready");

    let reader_transport = transport.clone();
    let reader_handle = thread::spawn(move || {
        let view_state = Arc::new(Mutex::new(ViewState::default()));
        let read_result = reader_loop(
            io::stdin().lock(),
            |envelope| match envelope {
                StateEnvelope::Render { sid, rev, vm } => {
                    let state_for_render = view_state.clone();
                    let transport_for_render = reader_transport.clone();

                    let _ = ui_weak.upgrade_in_event_loop(move |ui| {
                        apply_render::<B>(
                            &ui,
                            &transport_for_render,
                            &state_for_render,
                            &sid,
                            rev,
                            vm,
                        );
                    });
                }
                StateEnvelope::Error {
                    sid,
                    rev,
                    code,
                    message,
                } => handle_state_error(&reader_transport, &sid, rev, code, message),
            },
            |err| handle_rejected_frame(&reader_transport, err),
        );

        if let Err(err) = &read_result {
            error!(%err, "reader loop terminated");
            reader_transport
                .errors()
                .record(ConnectionError::ReaderStopped(err.to_string()));
        }

        let quit_result = slint::invoke_from_event_loop(|| {
            let _ = slint::quit_event_loop();
        });

        if let Err(err) = quit_result {
            error!(%err, "failed to request UI event loop quit");
        }

        read_result
    });

    ui.run()?;

    // Drop UI first so callback closures release their channel clones.
    drop(ui);
    drop(transport);

    if reader_handle.is_finished() {
        match reader_handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(%err, "reader thread returned error"),
            Err(err) => error!(?err, "reader thread join failed"),
        }
    } else {
        // Avoid hanging process exit on a blocked stdio read during teardown.
        warn!("reader thread still active during shutdown; skipping join");
    }

    if writer_handle.is_finished() {
        match writer_handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(%err, "writer thread returned error"),
            Err(err) => error!(?err, "writer thread join failed"),
        }
    } else {
        warn!("writer thread still active during shutdown; skipping join");
    }

    Ok(())
}

fn apply_render<B: HostBindings>(
    ui: &B::Ui,
    transport: &ChannelTransport,
    view_state: &Mutex<ViewState>,
    sid: &str,
    rev: u64,
    vm: Value,
) {
    let Ok(mut state) = view_state.lock() else {
        transport.request_resync("failed to lock view state for render");
        return;
    };

    if let Err(err) = state.check_render(transport.sid(), sid, rev) {
        state.reset_for_resync();
        transport.request_resync(&err.to_string());
        return;
    }

    if let Err(err) = B::apply_render(ui, &vm) {
        state.reset_for_resync();
        transport.request_resync(&format!("render apply failed: {err}"));
        return;
    }

    state.apply(rev);
    transport.resync_completed();
}

// A bad frame costs one render at most: skip it and ask for a fresh one.
fn handle_rejected_frame(transport: &ChannelTransport, err: ProtocolError) {
    warn!(%err, "discarding inbound frame");
    let reason = format!("inbound frame rejected: {err}");
    transport
        .errors()
        .record(ConnectionError::RejectedFrame(err.to_string()));
    transport.request_resync(&reason);
}

/// Only protocol-level error codes reach the connection log. Handler failures
/// belong to the state owner and are just logged.
fn handle_state_error(
    transport: &ChannelTransport,
    sid: &str,
    rev: Option<u64>,
    code: String,
    message: String,
) {
    if !should_resync_for_error(&code) {
        debug!(%sid, ?rev, %code, %message, "state owner reported handler error");
        return;
    }

    warn!(%sid, ?rev, %code, %message, "state owner reported protocol error");
    let reason = format!("state owner requested resync via error code '{code}'");
    transport
        .errors()
        .record(ConnectionError::Server { code, message });
    transport.request_resync(&reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HostEnvelope;

    fn transport_with_queue() -> (ChannelTransport, mpsc::Receiver<HostEnvelope>) {
        let (tx, rx) = mpsc::sync_channel(4);
        (ChannelTransport::new(tx, "S1", 4, ConnectionLog::new()), rx)
    }

    #[test]
    fn rejected_frame_is_recorded_and_requests_one_resync() {
        let (transport, rx) = transport_with_queue();
        let decode_err = serde_json::from_slice::<StateEnvelope>(br#"{"t":"patch"}"#)
            .expect_err("unknown tag");

        handle_rejected_frame(&transport, ProtocolError::Json(decode_err));
        handle_rejected_frame(
            &transport,
            ProtocolError::FrameTooLarge {
                len: 2_000_000,
                max: 1_048_576,
            },
        );

        let errors = transport.connection_errors();
        assert_eq!(errors.len(), 2);
        assert!(
            errors
                .iter()
                .all(|err| matches!(err, ConnectionError::RejectedFrame(_)))
        );
        assert!(transport.resync_pending());
        assert!(matches!(rx.try_recv(), Ok(HostEnvelope::Ready { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn handler_errors_stay_out_of_the_connection_log() {
        let (transport, rx) = transport_with_queue();

        handle_state_error(
            &transport,
            "S1",
            Some(4),
            "handler_not_found".to_string(),
            "no such handler".to_string(),
        );

        assert!(transport.connection_errors().is_empty());
        assert!(!transport.resync_pending());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn protocol_errors_are_recorded_and_trigger_resync() {
        let (transport, rx) = transport_with_queue();

        handle_state_error(
            &transport,
            "S1",
            None,
            "rev_mismatch".to_string(),
            "stale".to_string(),
        );

        assert_eq!(
            transport.connection_errors(),
            vec![ConnectionError::Server {
                code: "rev_mismatch".to_string(),
                message: "stale".to_string()
            }]
        );
        assert!(matches!(rx.try_recv(), Ok(HostEnvelope::Ready { .. })));
    }
}
