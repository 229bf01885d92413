//! The store: every value bound to a variable lives in exactly one of its cells.
//!
//! Cells are only ever appended, so an [`Address`] handed out once stays valid (and keeps
//! pointing at the same cell) for as long as the store lives.
use core::fmt;

use crate::value::Value;

/// Index of a single cell in the [`Store`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(usize);

impl Address {
    pub fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for Address {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("illegal address {address} (store holds {len} cells)")]
pub struct AddressError {
    pub address: Address,
    pub len: usize,
}

/// Append-only sequence of mutable cells
#[derive(Debug, Default)]
pub struct Store {
    cells: Vec<Value>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a cell holding `value`, returning its address (the length before the append).
    pub fn allocate(&mut self, value: Value) -> Address {
        let address = Address(self.cells.len());
        self.cells.push(value);
        tracing::trace!(%address, "allocated cell");
        address
    }

    pub fn read(&self, address: Address) -> Result<&Value, AddressError> {
        self.cells.get(address.0).ok_or(AddressError {
            address,
            len: self.cells.len(),
        })
    }

    /// Replaces the value held at `address`.
    ///
    /// Writing outside of the allocated range does nothing.
    pub fn write(&mut self, address: Address, value: Value) {
        match self.cells.get_mut(address.0) {
            Some(cell) => *cell = value,
            None => tracing::warn!(
                %address,
                len = self.cells.len(),
                "ignoring write outside of the store"
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
