//! Environments map names to store [`Address`]es.
//!
//! All frames live in a single arena ([`Environments`]) and refer to their enclosing
//! environment by [`EnvId`], so closures capturing an environment never own it.
//! There is exactly one global frame, which grows as top-level definitions run; every other
//! frame is fixed once it is created.
use crate::{compiler::ast::Name, runtime::store::Address};

/// Handle to an environment in the [`Environments`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvId {
    Global,
    Extended(usize),
}

impl EnvId {
    pub fn is_global(self) -> bool {
        self == Self::Global
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unbound variable")]
pub struct UnboundVariable(pub Name);

#[derive(Debug, Default)]
struct GlobalFrame {
    names: Vec<Name>,
    addresses: Vec<Address>,
}

#[derive(Debug)]
struct ExtendedFrame {
    bindings: Box<[(Name, Address)]>,
    next: EnvId,
}

#[derive(Debug, Default)]
pub struct Environments {
    global: GlobalFrame,
    frames: Vec<ExtendedFrame>,
}

impl Environments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walks the chain starting at `env`, innermost frame first.
    pub fn resolve_address(&self, env: EnvId, name: Name) -> Result<Address, UnboundVariable> {
        let mut current = env;
        loop {
            match current {
                EnvId::Global => {
                    // later definitions shadow earlier ones
                    return self
                        .global
                        .names
                        .iter()
                        .rposition(|n| *n == name)
                        .map(|idx| self.global.addresses[idx])
                        .ok_or(UnboundVariable(name));
                }
                EnvId::Extended(idx) => {
                    let frame = &self.frames[idx];
                    if let Some((_, address)) = frame.bindings.iter().find(|(n, _)| *n == name) {
                        return Ok(*address);
                    }
                    current = frame.next;
                }
            }
        }
    }

    /// Appends a binding to the global frame.
    pub fn extend_global(&mut self, name: Name, address: Address) {
        tracing::trace!(?name, %address, "extending global frame");
        self.global.names.push(name);
        self.global.addresses.push(address);
    }

    /// Creates a new frame binding `names` to `addresses`, enclosed by `enclosing`.
    pub fn extend(&mut self, names: &[Name], addresses: &[Address], enclosing: EnvId) -> EnvId {
        debug_assert_eq!(names.len(), addresses.len());
        let id = EnvId::Extended(self.frames.len());
        self.frames.push(ExtendedFrame {
            bindings: names.iter().copied().zip(addresses.iter().copied()).collect(),
            next: enclosing,
        });
        tracing::trace!(?id, ?enclosing, bindings = names.len(), "extended environment");
        id
    }

    /// The bindings of the global frame, oldest first
    pub fn global_bindings(&self) -> impl Iterator<Item = (Name, Address)> + '_ {
        self.global
            .names
            .iter()
            .copied()
            .zip(self.global.addresses.iter().copied())
    }

    /// Number of extended frames created so far
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}
