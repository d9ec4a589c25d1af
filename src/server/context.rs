use std::collections::BTreeMap;

use crate::codec::Encoding;
use crate::consts::{MAX_READ_COUNT, MAX_WRITE_COUNT};
use crate::{ErrorKind, VectorTrait};

#[cfg(feature = "with_bincode")]
use bincode::{Decode, Encode};
#[cfg(feature = "with_serde")]
use serde::{Deserialize, Serialize};

/// Holding register storage
///
/// Implementors provide the single-register primitives, bulk access is built on top of them. A
/// range is always validated completely before anything is written, so a failed write leaves
/// the store untouched.
pub trait RegisterStore {
    /// Get a single holding
    fn get_holding(&self, reg: u16) -> Result<u16, ErrorKind>;

    /// Set a single holding
    ///
    /// Never creates a register: an address outside the store fails with
    /// [`ErrorKind::IllegalDataAddress`].
    fn set_holding(&mut self, reg: u16, value: u16) -> Result<(), ErrorKind>;

    /// Is the address backed by a register
    fn contains(&self, reg: u16) -> bool;

    /// Make sure every address in `reg..reg + count` exists and the range does not wrap past
    /// 65535
    fn check_range(&self, reg: u16, count: u16) -> Result<(), ErrorKind> {
        let end = u32::from(reg) + u32::from(count);
        if end > 0x1_0000 {
            return Err(ErrorKind::IllegalDataAddress);
        }
        if (0..count).all(|i| self.contains(reg + i)) {
            Ok(())
        } else {
            Err(ErrorKind::IllegalDataAddress)
        }
    }

    /// Read `count` consecutive holdings
    ///
    /// `count` must be in 1..=125.
    fn read_holdings(&self, reg: u16, count: u16) -> Result<Vec<u16>, ErrorKind> {
        if count == 0 || count > MAX_READ_COUNT {
            return Err(ErrorKind::IllegalDataValue);
        }
        self.check_range(reg, count)?;
        (0..count).map(|i| self.get_holding(reg + i)).collect()
    }

    /// Get holdings as Vec of u8, big-endian
    ///
    /// Note: Vec is always appended
    fn get_holdings_as_u8<V: VectorTrait<u8>>(
        &self,
        reg: u16,
        count: u16,
        result: &mut V,
    ) -> Result<(), ErrorKind> {
        for holding in self.read_holdings(reg, count)? {
            result.extend(&holding.to_be_bytes())?;
        }
        Ok(())
    }

    /// Write consecutive holdings
    ///
    /// 1..=123 values, all addresses must exist.
    #[allow(clippy::cast_possible_truncation)]
    fn write_holdings(&mut self, reg: u16, values: &[u16]) -> Result<(), ErrorKind> {
        if values.is_empty() || values.len() > usize::from(MAX_WRITE_COUNT) {
            return Err(ErrorKind::IllegalDataValue);
        }
        self.check_range(reg, values.len() as u16)?;
        for (i, value) in (0..).zip(values) {
            self.set_holding(reg + i, *value)?;
        }
        Ok(())
    }

    /// Encode a measurement and store it at `reg` (one or two registers)
    fn set_measurement(
        &mut self,
        reg: u16,
        value: f64,
        encoding: &Encoding,
    ) -> Result<(), ErrorKind> {
        let words = encoding.encode(value)?;
        self.check_range(reg, encoding.span())?;
        for (i, word) in (0..).zip(&words) {
            self.set_holding(reg + i, *word)?;
        }
        Ok(())
    }

    /// Read and decode the measurement stored at `reg`
    fn get_measurement(&self, reg: u16, encoding: &Encoding) -> Result<f64, ErrorKind> {
        encoding.decode(&self.read_holdings(reg, encoding.span())?)
    }
}

/// Contiguous block of holdings `[base, base + len)`
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "with_serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "with_bincode", derive(Decode, Encode))]
pub struct DenseStore {
    base: u16,
    holdings: Vec<u16>,
}

impl DenseStore {
    /// Zero-filled block
    ///
    /// The block must end at or before 65536, a range running past the last address fails with
    /// [`ErrorKind::IllegalDataAddress`].
    pub fn new(base: u16, len: u32) -> Result<Self, ErrorKind> {
        if u32::from(base) + len > 0x1_0000 {
            return Err(ErrorKind::IllegalDataAddress);
        }
        let len = usize::try_from(len).map_err(|_| ErrorKind::IllegalDataAddress)?;
        Ok(Self {
            base,
            holdings: vec![0; len],
        })
    }

    /// Block seeded with `values`, the first one at `base`
    pub fn with_values(base: u16, values: &[u16]) -> Result<Self, ErrorKind> {
        if usize::from(base) + values.len() > 0x1_0000 {
            return Err(ErrorKind::IllegalDataAddress);
        }
        Ok(Self {
            base,
            holdings: values.to_vec(),
        })
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.holdings
    }

    #[inline]
    fn index(&self, reg: u16) -> Option<usize> {
        reg.checked_sub(self.base)
            .map(usize::from)
            .filter(|i| *i < self.holdings.len())
    }
}

impl RegisterStore for DenseStore {
    fn get_holding(&self, reg: u16) -> Result<u16, ErrorKind> {
        self.index(reg)
            .map(|i| self.holdings[i])
            .ok_or(ErrorKind::IllegalDataAddress)
    }

    fn set_holding(&mut self, reg: u16, value: u16) -> Result<(), ErrorKind> {
        let i = self.index(reg).ok_or(ErrorKind::IllegalDataAddress)?;
        self.holdings[i] = value;
        Ok(())
    }

    fn contains(&self, reg: u16) -> bool {
        self.index(reg).is_some()
    }
}

/// Explicit address map
///
/// Only seeded addresses exist; reading an unmapped address is an error, not zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "with_serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "with_bincode", derive(Decode, Encode))]
pub struct SparseStore {
    holdings: BTreeMap<u16, u16>,
}

impl SparseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map an address, creating it if absent
    ///
    /// The only way to grow the map.
    pub fn seed(&mut self, reg: u16, value: u16) {
        self.holdings.insert(reg, value);
    }

    /// Map consecutive addresses starting at `reg`
    pub fn seed_bulk(&mut self, reg: u16, values: &[u16]) -> Result<(), ErrorKind> {
        if usize::from(reg) + values.len() > 0x1_0000 {
            return Err(ErrorKind::IllegalDataAddress);
        }
        for (i, value) in values.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            self.seed(reg + i as u16, *value);
        }
        Ok(())
    }

    /// Map a measurement, creating its registers if absent
    pub fn seed_measurement(
        &mut self,
        reg: u16,
        value: f64,
        encoding: &Encoding,
    ) -> Result<(), ErrorKind> {
        let words = encoding.encode(value)?;
        self.seed_bulk(reg, &words)
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    /// Mapped addresses, ascending
    pub fn addresses(&self) -> impl Iterator<Item = u16> + '_ {
        self.holdings.keys().copied()
    }
}

impl RegisterStore for SparseStore {
    fn get_holding(&self, reg: u16) -> Result<u16, ErrorKind> {
        self.holdings
            .get(&reg)
            .copied()
            .ok_or(ErrorKind::IllegalDataAddress)
    }

    fn set_holding(&mut self, reg: u16, value: u16) -> Result<(), ErrorKind> {
        let holding = self
            .holdings
            .get_mut(&reg)
            .ok_or(ErrorKind::IllegalDataAddress)?;
        *holding = value;
        Ok(())
    }

    fn contains(&self, reg: u16) -> bool {
        self.holdings.contains_key(&reg)
    }
}

/// Store layout, chosen at configuration time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "with_serde", derive(Deserialize, Serialize))]
pub enum StoreLayout {
    /// `len` up to 65536, so a block may cover the whole address space
    Dense { base: u16, len: u32 },
    Sparse,
}

/// Either store layout behind one type
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "with_serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "with_bincode", derive(Decode, Encode))]
pub enum HoldingStore {
    Dense(DenseStore),
    Sparse(SparseStore),
}

impl HoldingStore {
    /// Empty store: zero-filled if dense, no addresses if sparse
    pub fn new(layout: StoreLayout) -> Result<Self, ErrorKind> {
        Ok(match layout {
            StoreLayout::Dense { base, len } => HoldingStore::Dense(DenseStore::new(base, len)?),
            StoreLayout::Sparse => HoldingStore::Sparse(SparseStore::new()),
        })
    }

    pub fn layout(&self) -> StoreLayout {
        match self {
            HoldingStore::Dense(store) => {
                // at most 65536 registers
                #[allow(clippy::cast_possible_truncation)]
                let len = store.len() as u32;
                StoreLayout::Dense {
                    base: store.base,
                    len,
                }
            }
            HoldingStore::Sparse(_) => StoreLayout::Sparse,
        }
    }
}

impl From<DenseStore> for HoldingStore {
    fn from(store: DenseStore) -> Self {
        HoldingStore::Dense(store)
    }
}

impl From<SparseStore> for HoldingStore {
    fn from(store: SparseStore) -> Self {
        HoldingStore::Sparse(store)
    }
}

impl RegisterStore for HoldingStore {
    fn get_holding(&self, reg: u16) -> Result<u16, ErrorKind> {
        match self {
            HoldingStore::Dense(store) => store.get_holding(reg),
            HoldingStore::Sparse(store) => store.get_holding(reg),
        }
    }

    fn set_holding(&mut self, reg: u16, value: u16) -> Result<(), ErrorKind> {
        match self {
            HoldingStore::Dense(store) => store.set_holding(reg, value),
            HoldingStore::Sparse(store) => store.set_holding(reg, value),
        }
    }

    fn contains(&self, reg: u16) -> bool {
        match self {
            HoldingStore::Dense(store) => store.contains(reg),
            HoldingStore::Sparse(store) => store.contains(reg),
        }
    }
}
