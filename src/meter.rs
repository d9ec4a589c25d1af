//! Energy meter register maps
//!
//! A [`MeterMap`] names the measurements a meter exposes and where each one lives. The same map
//! seeds a simulated meter's store and drives polling of a real one.
use log::{debug, warn};

use crate::client::Requester;
use crate::codec::{ByteOrder, Encoding, WordOrder};
use crate::server::context::{HoldingStore, RegisterStore, SparseStore, StoreLayout};
use crate::transport::Transport;
use crate::{ErrorKind, UnitId};

#[cfg(feature = "with_serde")]
use serde::{Deserialize, Serialize};

/// Voltage, frequency, current and power of a healthy meter
pub const FIXED_VALUES: [f64; 4] = [220.0, 120.0, 50.0, 115.0];

/// Dead line, overloaded current and reverse power
pub const ABNORMAL_VALUES: [f64; 4] = [0.0, 0.0, 999.9, -50.0];

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "with_serde", derive(Deserialize, Serialize))]
pub struct MeasurementPoint {
    pub name: String,
    pub address: u16,
    pub encoding: Encoding,
}

impl MeasurementPoint {
    pub fn new(name: &str, address: u16, encoding: Encoding) -> Self {
        Self {
            name: name.to_owned(),
            address,
            encoding,
        }
    }

    /// Address one past the last register
    pub fn end(&self) -> u32 {
        u32::from(self.address) + u32::from(self.encoding.span())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "with_serde", derive(Deserialize, Serialize))]
pub struct MeterMap {
    pub points: Vec<MeasurementPoint>,
}

impl MeterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn point(mut self, name: &str, address: u16, encoding: Encoding) -> Self {
        self.points.push(MeasurementPoint::new(name, address, encoding));
        self
    }

    /// Voltage, frequency, current and power at 0..=3, one register each, scale 10
    ///
    /// Power is signed, so reverse power round-trips.
    pub fn single_register() -> Self {
        Self::new()
            .point("voltage", 0, Encoding::scaled(10))
            .point("frequency", 1, Encoding::scaled(10))
            .point("current", 2, Encoding::scaled(10))
            .point("power", 3, Encoding::scaled_signed(10))
    }

    /// The same four measurements as float32 (big-endian bytes, swapped words) in consecutive
    /// register pairs starting at `base`
    pub fn dual_register(base: u16) -> Self {
        let encoding = Encoding::float32(ByteOrder::Big, WordOrder::Little);
        Self::new()
            .point("voltage", base, encoding)
            .point("frequency", base.wrapping_add(2), encoding)
            .point("current", base.wrapping_add(4), encoding)
            .point("power", base.wrapping_add(6), encoding)
    }

    /// Float32 map of the three-phase meters on the plant bus
    pub fn three_phase_float() -> Self {
        let encoding = Encoding::float32(ByteOrder::Big, WordOrder::Little);
        Self::new()
            .point("V_LL", 132, encoding)
            .point("Voltage", 140, encoding)
            .point("Current", 148, encoding)
            .point("Frequency", 156, encoding)
            .point("Power", 100, encoding)
            .point("PF", 116, encoding)
            .point("Energy", 158, encoding)
    }

    pub fn get(&self, name: &str) -> Option<&MeasurementPoint> {
        self.points.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Smallest dense block covering every point
    ///
    /// A float at 65535 would need a block past the last address, building a store from such a
    /// layout fails.
    pub fn dense_layout(&self) -> StoreLayout {
        let base = self.points.iter().map(|p| p.address).min().unwrap_or(0);
        let end = self
            .points
            .iter()
            .map(MeasurementPoint::end)
            .max()
            .unwrap_or(u32::from(base));
        StoreLayout::Dense {
            base,
            len: end - u32::from(base),
        }
    }

    /// Build a store holding `values`, one per point in map order
    ///
    /// A dense layout must cover every point. A sparse store maps exactly the points' registers.
    pub fn seed_store(
        &self,
        layout: StoreLayout,
        values: &[f64],
    ) -> Result<HoldingStore, ErrorKind> {
        if values.len() != self.points.len() {
            return Err(ErrorKind::ValueOutOfRange);
        }
        let mut store = match layout {
            StoreLayout::Dense { .. } => HoldingStore::new(layout)?,
            StoreLayout::Sparse => {
                let mut sparse = SparseStore::new();
                for (point, value) in self.points.iter().zip(values) {
                    sparse.seed_measurement(point.address, *value, &point.encoding)?;
                }
                return Ok(sparse.into());
            }
        };
        for (point, value) in self.points.iter().zip(values) {
            store.set_measurement(point.address, *value, &point.encoding)?;
        }
        debug!("store seeded with {} measurements", values.len());
        Ok(store)
    }

    /// Read every point from a meter
    ///
    /// A failing point does not abort the others.
    pub fn poll<'a, T: Transport>(
        &'a self,
        requester: &mut Requester<T>,
        unit_id: UnitId,
    ) -> Vec<(&'a str, Result<f64, ErrorKind>)> {
        self.points
            .iter()
            .map(|point| {
                let value = requester.read_measurement(unit_id, point.address, &point.encoding);
                if let Err(e) = value {
                    warn!("unit {} {} @ {}: {}", unit_id, point.name, point.address, e);
                }
                (point.name.as_str(), value)
            })
            .collect()
    }
}
