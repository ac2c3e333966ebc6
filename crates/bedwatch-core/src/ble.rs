//! Native BLE session backend (btleplug).
//!
//! Opens a GATT connection to the sensor, locates the Digital
//! characteristic, and performs bounded single reads of the occupancy
//! switch. All operations are wrapped in timeouts; recovery policy lives in
//! the supervisor and poll loop.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use bedwatch_types::DeviceIdentity;
use bedwatch_types::uuid::DIGITAL;

use crate::error::{Error, Result};
use crate::session::{PeripheralSession, SessionConfig, SessionFactory};

/// How long to scan when the target peripheral is not already known to the
/// adapter.
const DISCOVERY_SCAN: Duration = Duration::from_secs(5);

/// Opens native BLE sessions against the occupancy sensor.
pub struct BleSessionFactory {
    config: SessionConfig,
}

impl BleSessionFactory {
    /// Create a factory with the given session timeouts.
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for BleSessionFactory {
    async fn open(&self, identity: &DeviceIdentity) -> Result<Box<dyn PeripheralSession>> {
        let session = timeout(
            self.config.init_timeout,
            BleSession::open(identity.clone(), self.config.clone()),
        )
        .await
        .map_err(|_| Error::timeout("session open", self.config.init_timeout))??;
        Ok(Box::new(session))
    }
}

/// A live native BLE session.
pub struct BleSession {
    /// Kept alive for the lifetime of the peripheral connection.
    #[allow(dead_code)]
    adapter: Adapter,
    peripheral: Peripheral,
    characteristic: btleplug::api::Characteristic,
    identity: DeviceIdentity,
    config: SessionConfig,
}

impl BleSession {
    /// Connect to the device and locate the occupancy characteristic.
    async fn open(identity: DeviceIdentity, config: SessionConfig) -> Result<Self> {
        let adapter = get_adapter(identity.adapter.as_deref()).await?;
        let peripheral = find_peripheral(&adapter, &identity).await?;

        peripheral
            .connect()
            .await
            .map_err(|e| Error::no_connect(&identity.address, e))?;
        debug!("Connected to {}, discovering services", identity);

        peripheral.discover_services().await?;

        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == DIGITAL)
            .ok_or_else(|| {
                Error::protocol(format!(
                    "device {} does not expose the Digital characteristic",
                    identity.address
                ))
            })?;

        info!("Session open against {}", identity);
        Ok(Self {
            adapter,
            peripheral,
            characteristic,
            identity,
            config,
        })
    }
}

#[async_trait]
impl PeripheralSession for BleSession {
    async fn read_switch(&mut self) -> Result<Vec<u8>> {
        let raw = timeout(
            self.config.read_timeout,
            self.peripheral.read(&self.characteristic),
        )
        .await
        .map_err(|_| Error::timeout("read_switch", self.config.read_timeout))??;
        Ok(raw)
    }

    async fn reconnect(&mut self) -> Result<()> {
        // In-place handshake on the existing peripheral handle; no teardown.
        timeout(self.config.init_timeout, self.peripheral.connect())
            .await
            .map_err(|_| Error::timeout("soft reconnect", self.config.init_timeout))??;
        debug!("Soft reconnect to {} succeeded", self.identity);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }

    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }
}

/// Get the Bluetooth adapter to use, optionally pinned by name.
async fn get_adapter(name: Option<&str>) -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    if let Some(name) = name {
        for adapter in &adapters {
            let info = adapter.adapter_info().await.unwrap_or_default();
            if info.contains(name) {
                return Ok(adapter.clone());
            }
        }
        warn!("Adapter '{}' not found, falling back to the first one", name);
    }

    adapters
        .into_iter()
        .next()
        .ok_or_else(|| Error::no_connect("<none>", "no Bluetooth adapter available"))
}

/// Find the target peripheral on the adapter.
///
/// Checks the adapter's known peripherals first; if the device is not cached
/// a short scan is run before looking again.
async fn find_peripheral(adapter: &Adapter, identity: &DeviceIdentity) -> Result<Peripheral> {
    if let Some(p) = match_peripheral(adapter, &identity.address).await? {
        return Ok(p);
    }

    debug!("{} not cached, scanning for it", identity);
    adapter.start_scan(ScanFilter::default()).await?;
    sleep(DISCOVERY_SCAN).await;
    adapter.stop_scan().await?;

    match_peripheral(adapter, &identity.address)
        .await?
        .ok_or_else(|| Error::no_connect(&identity.address, "device not found in range"))
}

/// Look for a peripheral whose address matches, case-insensitively.
async fn match_peripheral(adapter: &Adapter, address: &str) -> Result<Option<Peripheral>> {
    let wanted = address.to_lowercase();
    for peripheral in adapter.peripherals().await? {
        if let Ok(Some(props)) = peripheral.properties().await
            && props.address.to_string().to_lowercase() == wanted
        {
            return Ok(Some(peripheral));
        }
    }
    Ok(None)
}
