use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use shared::domain::{ConnectionState, DeviceSlotIndex};
use tokio::sync::{broadcast, RwLock};
use tracing::info;

/// Haptic device primitives. Slots are the serialized sensation codes, in
/// device slot order; `send` addresses them by position.
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    async fn configure(&self, slots: Vec<String>) -> Result<()>;
    async fn auto_connect(&self) -> Result<ConnectionState>;
    async fn send(&self, index: DeviceSlotIndex) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
    async fn connection_state(&self) -> ConnectionState;
}

pub struct MissingDeviceGateway;

#[async_trait]
impl DeviceGateway for MissingDeviceGateway {
    async fn configure(&self, _slots: Vec<String>) -> Result<()> {
        Err(anyhow!("haptic device backend is unavailable"))
    }

    async fn auto_connect(&self) -> Result<ConnectionState> {
        Err(anyhow!("haptic device backend is unavailable"))
    }

    async fn send(&self, index: DeviceSlotIndex) -> Result<()> {
        Err(anyhow!(
            "haptic device backend is unavailable for slot {index}"
        ))
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn connection_state(&self) -> ConnectionState {
        ConnectionState::Disconnected
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceActuation {
    pub index: DeviceSlotIndex,
    pub code: String,
}

#[derive(Default)]
struct SimulatedState {
    slots: Vec<String>,
    connected: bool,
}

/// In-process device that accepts the configured slots and reports every
/// actuation on a broadcast channel instead of driving hardware.
pub struct SimulatedDeviceGateway {
    state: RwLock<SimulatedState>,
    actuations: broadcast::Sender<DeviceActuation>,
}

impl SimulatedDeviceGateway {
    pub fn new() -> Self {
        let (actuations, _) = broadcast::channel(64);
        Self {
            state: RwLock::new(SimulatedState::default()),
            actuations,
        }
    }

    pub fn subscribe_actuations(&self) -> broadcast::Receiver<DeviceActuation> {
        self.actuations.subscribe()
    }

    pub async fn configured_slots(&self) -> Vec<String> {
        self.state.read().await.slots.clone()
    }
}

impl Default for SimulatedDeviceGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceGateway for SimulatedDeviceGateway {
    async fn configure(&self, slots: Vec<String>) -> Result<()> {
        let mut state = self.state.write().await;
        info!(slots = slots.len(), "device: configured simulated sensations");
        state.slots = slots;
        Ok(())
    }

    async fn auto_connect(&self) -> Result<ConnectionState> {
        let mut state = self.state.write().await;
        if state.slots.is_empty() {
            bail!("device must be configured with at least one sensation before connecting");
        }
        state.connected = true;
        Ok(ConnectionState::Connected)
    }

    async fn send(&self, index: DeviceSlotIndex) -> Result<()> {
        let state = self.state.read().await;
        if !state.connected {
            bail!("device is not connected");
        }
        let code = state
            .slots
            .get(index.0)
            .cloned()
            .ok_or_else(|| anyhow!("slot {index} is not configured on the device"))?;
        info!(slot = %index, %code, "device: actuating sensation");
        let _ = self.actuations.send(DeviceActuation { index, code });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.write().await.connected = false;
        Ok(())
    }

    async fn connection_state(&self) -> ConnectionState {
        if self.state.read().await.connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
