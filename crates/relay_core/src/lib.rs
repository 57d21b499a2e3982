use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use catalog::Catalog;
use codec::FormatError;
use device::DeviceGateway;
use shared::{
    domain::{ConnectionState, DeviceSlotIndex},
    error::{TriggerError, TriggerErrorKind, TriggerException},
    protocol::{InboundEvent, OutboundEvent},
};
use tokio::{
    sync::mpsc,
    time::{sleep_until, Instant},
};
use tracing::{debug, error, info, warn};

pub mod transport;

pub use transport::{connect_event_channel, event_channel_url, EventChannelUrlError, WsEventSink};

const TEST_SENSATION_SLOT: DeviceSlotIndex = DeviceSlotIndex(0);
const TEST_SENSATION_HOLD: Duration = Duration::from_millis(100);
const CONTROL_LANE_CAPACITY: usize = 8;

/// Outbound half of the event channel.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: OutboundEvent) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// Receiving ends of the two inbound lanes. Triggers and test requests share
/// the dispatch lane so actuations stay serialized; `stop` travels on the
/// control lane, which the engine watches even while a sensation is playing.
///
/// The dispatch lane is unbounded: every queued trigger is eventually answered.
pub struct InboundLanes {
    pub dispatch: mpsc::UnboundedReceiver<InboundEvent>,
    pub control: mpsc::Receiver<InboundEvent>,
}

#[derive(Clone)]
pub struct InboundRouter {
    dispatch: mpsc::UnboundedSender<InboundEvent>,
    control: mpsc::Sender<InboundEvent>,
}

pub fn inbound_lanes() -> (InboundRouter, InboundLanes) {
    let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
    let (control_tx, control_rx) = mpsc::channel(CONTROL_LANE_CAPACITY);
    (
        InboundRouter {
            dispatch: dispatch_tx,
            control: control_tx,
        },
        InboundLanes {
            dispatch: dispatch_rx,
            control: control_rx,
        },
    )
}

impl InboundRouter {
    /// Routes an event to its lane. Returns `false` once the engine has gone away.
    pub fn route(&self, event: InboundEvent) -> bool {
        match event {
            InboundEvent::Stop { .. } => match self.control.try_send(event) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(event)) => {
                    warn!(?event, "relay: stop already pending; dropping duplicate");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            },
            InboundEvent::Trigger { .. } | InboundEvent::Test => {
                self.dispatch.send(event).is_ok()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Executing {
        slot: DeviceSlotIndex,
        request_id: Option<String>,
        ends_at: Instant,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineExit {
    Stopped { reason: String },
    ChannelClosed,
}

pub struct DispatchEngine {
    catalog: Arc<Catalog>,
    device: Arc<dyn DeviceGateway>,
    events: Arc<dyn EventSink>,
    state: EngineState,
}

impl DispatchEngine {
    pub fn new(
        catalog: Arc<Catalog>,
        device: Arc<dyn DeviceGateway>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            catalog,
            device,
            events,
            state: EngineState::Idle,
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Drives the engine until a `stop` arrives or the dispatch lane closes.
    pub async fn run(mut self, mut lanes: InboundLanes) -> Result<EngineExit> {
        let mut control_open = true;
        loop {
            let deadline = match &self.state {
                EngineState::Idle => None,
                EngineState::Executing { ends_at, .. } => Some(*ends_at),
            };

            tokio::select! {
                biased;
                control = lanes.control.recv(), if control_open => match control {
                    Some(InboundEvent::Stop { reason }) => return Ok(self.shutdown(reason).await),
                    Some(other) => warn!(?other, "relay: unexpected event on control lane"),
                    None => control_open = false,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.complete().await;
                }
                request = lanes.dispatch.recv(), if deadline.is_none() => match request {
                    Some(request) => self.handle(request).await,
                    None => {
                        self.release().await;
                        return Ok(EngineExit::ChannelClosed);
                    }
                },
            }
        }
    }

    /// Services one dispatch-lane event while idle.
    pub(crate) async fn handle(&mut self, request: InboundEvent) {
        if self.state != EngineState::Idle {
            warn!(?request, "relay: engine busy; request refused");
            if let InboundEvent::Trigger { request_id, .. } = request {
                self.emit(OutboundEvent::TriggerError(TriggerError::busy(request_id)))
                    .await;
            }
            return;
        }
        match request {
            InboundEvent::Trigger {
                keyword,
                request_id,
            } => self.trigger(&keyword, request_id).await,
            InboundEvent::Test => self.test().await,
            InboundEvent::Stop { .. } => warn!("relay: stop delivered on dispatch lane; ignoring"),
        }
    }

    async fn trigger(&mut self, keyword: &str, request_id: String) {
        match self.actuate(keyword, &request_id).await {
            Ok((slot, duration)) => {
                self.state = EngineState::Executing {
                    slot,
                    request_id: Some(request_id),
                    ends_at: Instant::now() + duration,
                };
            }
            Err(exception) => {
                self.emit(OutboundEvent::TriggerError(TriggerError::from(exception)))
                    .await;
            }
        }
    }

    async fn actuate(
        &self,
        keyword: &str,
        request_id: &str,
    ) -> std::result::Result<(DeviceSlotIndex, Duration), TriggerException> {
        let connection = self.device.connection_state().await;
        if connection != ConnectionState::Connected {
            warn!(
                %keyword,
                %request_id,
                %connection,
                "relay: trigger received while device is not connected"
            );
            return Err(TriggerError::disconnected(request_id).into());
        }
        info!(%keyword, %request_id, %connection, "relay: shock command received");

        let Some(slot) = self.catalog.registry().get(keyword) else {
            info!(%keyword, %request_id, "relay: unknown shock command received");
            return Err(TriggerError::unrecognized(request_id).into());
        };

        let Some(entry) = self.catalog.slot(slot) else {
            error!(
                %keyword,
                %slot,
                slots = self.catalog.len(),
                "relay: registry points outside the catalog"
            );
            return Err(TriggerException::new(
                TriggerErrorKind::Internal,
                request_id,
                format!("sensation slot {slot} is not present in the catalog"),
            ));
        };

        let parsed = entry
            .reparse()
            .map_err(|err| invalid_sensation(request_id, &entry.uuid, err))?;
        let duration = parsed
            .total_duration()
            .map_err(|err| invalid_sensation(request_id, &entry.uuid, err))?;

        info!(
            name = %parsed.name,
            %slot,
            "relay: shock command triggered ({:.2}s)",
            duration.as_secs_f64()
        );

        self.device.send(slot).await.map_err(|err| {
            error!(%slot, %request_id, error = %err, "relay: device send failed");
            TriggerException::new(
                TriggerErrorKind::DeviceError,
                request_id,
                format!("The device rejected the sensation: {err}"),
            )
        })?;

        Ok((slot, duration))
    }

    async fn test(&mut self) {
        info!("relay: test command received");
        let connection = self.device.connection_state().await;
        if connection != ConnectionState::Connected {
            warn!(%connection, "relay: skipping test sensation; device is not connected");
            return;
        }
        if self.catalog.is_empty() {
            warn!("relay: skipping test sensation; catalog is empty");
            return;
        }
        if let Err(err) = self.device.send(TEST_SENSATION_SLOT).await {
            warn!(error = %err, "relay: test sensation failed");
            return;
        }
        self.state = EngineState::Executing {
            slot: TEST_SENSATION_SLOT,
            request_id: None,
            ends_at: Instant::now() + TEST_SENSATION_HOLD,
        };
    }

    async fn complete(&mut self) {
        let finished = std::mem::replace(&mut self.state, EngineState::Idle);
        if let EngineState::Executing {
            slot,
            request_id: Some(request_id),
            ..
        } = finished
        {
            debug!(%slot, %request_id, "relay: sensation finished");
            self.emit(OutboundEvent::TriggerResponse { request_id }).await;
        }
    }

    async fn shutdown(&mut self, reason: String) -> EngineExit {
        info!(%reason, "relay: stop received");
        self.release().await;
        EngineExit::Stopped { reason }
    }

    async fn release(&mut self) {
        if let Err(err) = self.device.disconnect().await {
            warn!(error = %err, "relay: device disconnect failed");
        }
        if let Err(err) = self.events.close().await {
            warn!(error = %err, "relay: closing event channel failed");
        }
    }

    async fn emit(&self, event: OutboundEvent) {
        let name = event.name();
        if let Err(err) = self.events.emit(event).await {
            error!(event = name, error = %err, "relay: failed to emit event");
        }
    }
}

fn invalid_sensation(request_id: &str, uuid: &str, err: FormatError) -> TriggerException {
    warn!(
        %request_id,
        %uuid,
        error = %err,
        "relay: sensation code failed to parse at trigger time"
    );
    TriggerException::new(TriggerErrorKind::InvalidSensation, request_id, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
