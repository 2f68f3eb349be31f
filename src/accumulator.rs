// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

use std::fmt;

use crate::error::Result;
use crate::hash::HashSpec;
use crate::pkcs11::*;

use openssl::hash::Hasher;
use zeroize::Zeroize;

/// Default raw buffer capacity: one 4096 bit RSA modulus
pub const DEFAULT_RAW_BUFFER_SIZE: usize = 512;

/// Running hash over every byte fed to an operation
pub struct HashState {
    spec: &'static HashSpec,
    hasher: Hasher,
}

impl fmt::Debug for HashState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HashState")
            .field("spec", &self.spec.name)
            .finish()
    }
}

/// Bounded buffer for mechanisms whose input is consumed unhashed
#[derive(Debug)]
pub struct RawBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

#[derive(Debug)]
pub enum Accumulator {
    Hash(HashState),
    Raw(RawBuffer),
}

impl Accumulator {
    pub fn hash(spec: &'static HashSpec) -> Result<Accumulator> {
        Ok(Accumulator::Hash(HashState {
            spec,
            hasher: Hasher::new(spec.message_digest())?,
        }))
    }

    pub fn raw(capacity: usize) -> Accumulator {
        Accumulator::Raw(RawBuffer {
            data: Vec::with_capacity(capacity),
            capacity,
        })
    }

    /// The hash in use, None in raw mode
    pub fn hash_spec(&self) -> Option<&'static HashSpec> {
        match self {
            Accumulator::Hash(h) => Some(h.spec),
            Accumulator::Raw(_) => None,
        }
    }

    /// Bytes accumulated so far in raw mode, always zero in hash mode
    pub fn raw_len(&self) -> usize {
        match self {
            Accumulator::Hash(_) => 0,
            Accumulator::Raw(r) => r.data.len(),
        }
    }

    /// Feeds data in. In raw mode the update is refused as a whole if it
    /// would exceed the buffer capacity.
    pub fn update(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Accumulator::Hash(h) => Ok(h.hasher.update(data)?),
            Accumulator::Raw(r) => {
                if data.len() > r.capacity - r.data.len() {
                    return Err(CKR_DATA_LEN_RANGE)?;
                }
                r.data.extend_from_slice(data);
                Ok(())
            }
        }
    }

    /// Completes the hash, or hands out the buffered bytes. The
    /// accumulator must not be fed again afterwards.
    pub fn finish(&mut self) -> Result<Vec<u8>> {
        match self {
            Accumulator::Hash(h) => Ok(h.hasher.finish()?.to_vec()),
            Accumulator::Raw(r) => Ok(std::mem::take(&mut r.data)),
        }
    }
}
