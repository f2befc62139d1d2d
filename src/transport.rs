//! Publish/subscribe seam for signaling traffic.
//!
//! The coordinator only publishes; inbound traffic is handed to
//! [`CallHandle::deliver`](crate::coordinator::CallHandle::deliver) by
//! whoever owns the subscription.

use crate::codec::{self, WireFormat};
use crate::coordinator::CallHandle;
use crate::errors::{CallError, Result};
use crate::signaling::SignalingMessage;
use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Reliable, ordered channel towards the other participant.
#[async_trait]
pub trait SignalingTransport: Send + Sync + 'static {
    async fn publish(&self, message: &SignalingMessage) -> Result<()>;
}

/// In-process transport: encoded messages travel over an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
    format: WireFormat,
}

/// Receiving end of a [`ChannelTransport`].
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<String>,
}

impl ChannelTransport {
    pub fn channel(format: WireFormat) -> (ChannelTransport, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelTransport { tx, format }, Inbox { rx })
    }

    /// Two connected endpoints: what one side publishes the other receives.
    pub fn pair(format: WireFormat) -> ((ChannelTransport, Inbox), (ChannelTransport, Inbox)) {
        let (a_out, b_in) = Self::channel(format);
        let (b_out, a_in) = Self::channel(format);
        ((a_out, a_in), (b_out, b_in))
    }
}

#[async_trait]
impl SignalingTransport for ChannelTransport {
    async fn publish(&self, message: &SignalingMessage) -> Result<()> {
        let encoded = codec::encode(message, self.format)?;
        debug!("-> {} ({} bytes)", message.event_name(), encoded.len());
        self.tx
            .send(encoded)
            .map_err(|_| CallError::Transport("peer channel closed".into()))
    }
}

impl Inbox {
    /// Next decoded message; `None` once the sending side is gone.
    pub async fn recv(&mut self) -> Option<Result<SignalingMessage>> {
        let raw = self.rx.recv().await?;
        Some(codec::decode(&raw))
    }

    pub fn try_recv(&mut self) -> Option<Result<SignalingMessage>> {
        self.rx.try_recv().ok().map(|raw| codec::decode(&raw))
    }

    /// Feeds every inbound message into the coordinator until either side closes.
    pub fn forward_to(mut self, handle: CallHandle) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = self.recv().await {
                match message {
                    Ok(message) => {
                        if handle.deliver(message).await.is_err() {
                            debug!("Coordinator gone, stopping inbox forwarding");
                            break;
                        }
                    }
                    Err(e) => warn!("Dropping undecodable signaling message: {e}"),
                }
            }
        })
    }
}
