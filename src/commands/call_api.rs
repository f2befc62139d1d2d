use crate::commands::DesktopCall;
use crate::peer::ice;
use crate::peer::types::ServerConfig;
use crate::session::CallStatus;
use crate::signaling::SignalingMessage;
use log::debug;
use std::time::Duration;
use tauri::{command, State};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[command]
pub async fn start_call(call: State<'_, DesktopCall>) -> Result<CallStatus, String> {
    call.handle.start_call().await.map_err(|e| e.to_string())
}

#[command]
pub async fn call_peer(
    call: State<'_, DesktopCall>,
    target: String,
) -> Result<CallStatus, String> {
    call.handle.call(target).await.map_err(|e| e.to_string())
}

#[command]
pub async fn accept_call(call: State<'_, DesktopCall>) -> Result<CallStatus, String> {
    call.handle.accept_call().await.map_err(|e| e.to_string())
}

#[command]
pub async fn reject_call(call: State<'_, DesktopCall>) -> Result<CallStatus, String> {
    call.handle.reject_call().await.map_err(|e| e.to_string())
}

#[command]
pub async fn end_call(call: State<'_, DesktopCall>) -> Result<CallStatus, String> {
    call.handle.end_call().await.map_err(|e| e.to_string())
}

#[command]
pub async fn toggle_audio(call: State<'_, DesktopCall>) -> Result<CallStatus, String> {
    call.handle.toggle_audio().await.map_err(|e| e.to_string())
}

#[command]
pub async fn toggle_video(call: State<'_, DesktopCall>) -> Result<CallStatus, String> {
    call.handle.toggle_video().await.map_err(|e| e.to_string())
}

/// Front-end relays signaling it received from the other user.
#[command]
pub async fn deliver_signal(
    call: State<'_, DesktopCall>,
    message: SignalingMessage,
) -> Result<CallStatus, String> {
    debug!("<- {}", message.event_name());
    call.handle.deliver(message).await.map_err(|e| e.to_string())
}

#[command]
pub fn call_status(call: State<'_, DesktopCall>) -> CallStatus {
    call.handle.status()
}

#[command]
pub async fn check_ice_server_availability(config: ServerConfig) -> Result<bool, String> {
    ice::probe(&config, PROBE_TIMEOUT)
        .await
        .map_err(|e| e.to_string())
}
