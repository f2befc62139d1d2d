//! Tauri plugin surface (feature `desktop`).
//!
//! Outbound signaling is emitted as `peercall://signal` for the web front-end
//! to relay over its socket; whatever the other user sends comes back in
//! through the `deliver_signal` command. Notices go out as `peercall://notice`.

pub mod call_api;

use crate::config::CallConfig;
use crate::coordinator::{CallCoordinator, CallHandle};
use crate::errors::{CallError, Result};
use crate::peer::{DeviceAvailability, WebRtcMedia, WebRtcPeerFactory};
use crate::signaling::SignalingMessage;
use crate::transport::SignalingTransport;
use async_trait::async_trait;
use log::warn;
use tauri::plugin::{Builder, TauriPlugin};
use tauri::{AppHandle, Emitter, Manager, Runtime};

pub const SIGNAL_EVENT: &str = "peercall://signal";
pub const NOTICE_EVENT: &str = "peercall://notice";

/// Managed state shared by the commands.
pub struct DesktopCall {
    pub handle: CallHandle,
}

/// Publishes signaling to the front-end, which forwards it to the other user.
pub struct TauriTransport<R: Runtime> {
    app: AppHandle<R>,
}

#[async_trait]
impl<R: Runtime> SignalingTransport for TauriTransport<R> {
    async fn publish(&self, message: &SignalingMessage) -> Result<()> {
        self.app
            .emit(SIGNAL_EVENT, message.clone())
            .map_err(|e| CallError::Transport(e.to_string()))
    }
}

pub fn init<R: Runtime>(config: CallConfig, devices: DeviceAvailability) -> TauriPlugin<R> {
    Builder::new("peercall")
        .invoke_handler(tauri::generate_handler![
            call_api::start_call,
            call_api::call_peer,
            call_api::accept_call,
            call_api::reject_call,
            call_api::end_call,
            call_api::toggle_audio,
            call_api::toggle_video,
            call_api::deliver_signal,
            call_api::call_status,
            call_api::check_ice_server_availability,
        ])
        .setup(move |app, _api| {
            crate::logger::init();
            config.validate()?;
            let peers = WebRtcPeerFactory::new(&config)?;
            let transport = TauriTransport { app: app.clone() };
            let (coordinator, handle, mut notices) =
                CallCoordinator::new(config, WebRtcMedia::new(devices), peers, transport);
            tauri::async_runtime::spawn(coordinator.run());

            let emitter = app.clone();
            tauri::async_runtime::spawn(async move {
                while let Some(notice) = notices.recv().await {
                    if let Err(e) = emitter.emit(NOTICE_EVENT, notice) {
                        warn!("Failed to emit notice: {e}");
                    }
                }
            });

            app.manage(DesktopCall { handle });
            Ok(())
        })
        .build()
}
