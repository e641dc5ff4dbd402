//! Device-wide index table
//!
//! Maps the 32-bit local indices carried in incoming handshake and transport
//! messages back to the peer they belong to. Entries are inserted when a
//! handshake is created, swapped over when it yields a key pair, and removed
//! when that key pair (or the abandoned handshake) is destroyed.

use dashmap::DashMap;
use rand::Rng;

use crate::error::CryptoError;
use crate::noise::keys::NoisePublicKey;

/// Random draws before giving up on finding a free index
const MAX_INDEX_ATTEMPTS: usize = 1024;

/// What a registered index currently points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Handshake,
    KeyPair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexTableEntry {
    pub peer: NoisePublicKey,
    pub kind: IndexKind,
}

#[derive(Debug, Default)]
pub struct IndexTable {
    table: DashMap<u32, IndexTableEntry>,
}

impl IndexTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a random unused non-zero index for an in-flight handshake
    pub fn new_index(&self, peer: NoisePublicKey) -> Result<u32, CryptoError> {
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_INDEX_ATTEMPTS {
            let index: u32 = rng.gen();
            if index == 0 {
                continue;
            }
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.table.entry(index) {
                slot.insert(IndexTableEntry {
                    peer,
                    kind: IndexKind::Handshake,
                });
                return Ok(index);
            }
        }
        Err(CryptoError::IndexExhausted)
    }

    /// Re-point a handshake index at the key pair derived from it
    pub fn swap_for_keypair(&self, index: u32) -> bool {
        match self.table.get_mut(&index) {
            Some(mut entry) => {
                entry.kind = IndexKind::KeyPair;
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, index: u32) -> Option<IndexTableEntry> {
        self.table.get(&index).map(|entry| *entry)
    }

    pub fn contains(&self, index: u32) -> bool {
        self.table.contains_key(&index)
    }

    /// Remove an index; zero is never allocated and is ignored
    pub fn delete(&self, index: u32) {
        if index != 0 {
            self.table.remove(&index);
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
