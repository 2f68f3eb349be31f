// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

//! Key material boundary with the object store.
//!
//! The engine never sees private keys. For every key it needs the key
//! type, the algorithm tag the token understands, the modulus size for
//! RSA keys, and the public key material used for local verification.

use crate::error::Result;
use crate::pkcs11::*;

pub type KeyHandle = CK_OBJECT_HANDLE;

/// Algorithm tags understood by the token, with their PIV identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    Rsa1024,
    Rsa2048,
    Rsa3072,
    Rsa4096,
    EccP256,
    EccP384,
    Ed25519,
}

impl KeyAlgorithm {
    pub fn piv_id(self) -> u8 {
        match self {
            KeyAlgorithm::Rsa1024 => 0x06,
            KeyAlgorithm::Rsa2048 => 0x07,
            KeyAlgorithm::Rsa3072 => 0x05,
            KeyAlgorithm::Rsa4096 => 0x16,
            KeyAlgorithm::EccP256 => 0x11,
            KeyAlgorithm::EccP384 => 0x14,
            KeyAlgorithm::Ed25519 => 0xE0,
        }
    }

    pub fn key_type(self) -> CK_KEY_TYPE {
        match self {
            KeyAlgorithm::Rsa1024
            | KeyAlgorithm::Rsa2048
            | KeyAlgorithm::Rsa3072
            | KeyAlgorithm::Rsa4096 => CKK_RSA,
            KeyAlgorithm::EccP256 | KeyAlgorithm::EccP384 => CKK_EC,
            KeyAlgorithm::Ed25519 => CKK_EC_EDWARDS,
        }
    }

    /// Size in bits as reported in mechanism info
    pub fn key_bits(self) -> usize {
        match self {
            KeyAlgorithm::Rsa1024 => 1024,
            KeyAlgorithm::Rsa2048 => 2048,
            KeyAlgorithm::Rsa3072 => 3072,
            KeyAlgorithm::Rsa4096 => 4096,
            KeyAlgorithm::EccP256 => 256,
            KeyAlgorithm::EccP384 => 384,
            KeyAlgorithm::Ed25519 => 255,
        }
    }

    /// Length in bytes of a signature produced with this algorithm. For
    /// EC keys this is the raw `r || s` form.
    pub fn signature_size(self) -> usize {
        match self {
            KeyAlgorithm::Rsa1024 => 128,
            KeyAlgorithm::Rsa2048 => 256,
            KeyAlgorithm::Rsa3072 => 384,
            KeyAlgorithm::Rsa4096 => 512,
            KeyAlgorithm::EccP256 => 64,
            KeyAlgorithm::EccP384 => 96,
            KeyAlgorithm::Ed25519 => 64,
        }
    }

    fn from_rsa_bits(bits: usize) -> Option<KeyAlgorithm> {
        match bits {
            1024 => Some(KeyAlgorithm::Rsa1024),
            2048 => Some(KeyAlgorithm::Rsa2048),
            3072 => Some(KeyAlgorithm::Rsa3072),
            4096 => Some(KeyAlgorithm::Rsa4096),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
}

impl EcCurve {
    /// Width in bytes of a field element
    pub fn field_len(self) -> usize {
        match self {
            EcCurve::P256 => 32,
            EcCurve::P384 => 48,
        }
    }

    pub fn nid(self) -> openssl::nid::Nid {
        match self {
            EcCurve::P256 => openssl::nid::Nid::X9_62_PRIME256V1,
            EcCurve::P384 => openssl::nid::Nid::SECP384R1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// Big endian modulus and public exponent
    Rsa { modulus: Vec<u8>, exponent: Vec<u8> },
    /// Uncompressed point `04 || X || Y`
    Ec { curve: EcCurve, point: Vec<u8> },
    Ed25519 { point: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct Key {
    handle: KeyHandle,
    algorithm: KeyAlgorithm,
    public: PublicKey,
}

fn strip_leading_zeros(v: &[u8]) -> &[u8] {
    let skip = v.iter().take_while(|b| **b == 0).count();
    &v[skip..]
}

impl Key {
    /// Builds a key from the public material held in the object store.
    /// Only the key sizes the token supports are accepted.
    pub fn new(handle: KeyHandle, public: PublicKey) -> Result<Key> {
        let (algorithm, public) = match public {
            PublicKey::Rsa { modulus, exponent } => {
                let modulus = strip_leading_zeros(&modulus).to_vec();
                let exponent = strip_leading_zeros(&exponent).to_vec();
                if modulus.is_empty() || exponent.is_empty() {
                    return Err(CKR_ARGUMENTS_BAD)?;
                }
                let bits = modulus_bits(&modulus);
                let Some(alg) = KeyAlgorithm::from_rsa_bits(bits) else {
                    return Err(CKR_KEY_SIZE_RANGE)?;
                };
                (alg, PublicKey::Rsa { modulus, exponent })
            }
            PublicKey::Ec { curve, point } => {
                if point.len() != 1 + 2 * curve.field_len() || point[0] != 0x04
                {
                    return Err(CKR_ARGUMENTS_BAD)?;
                }
                let alg = match curve {
                    EcCurve::P256 => KeyAlgorithm::EccP256,
                    EcCurve::P384 => KeyAlgorithm::EccP384,
                };
                (alg, PublicKey::Ec { curve, point })
            }
            PublicKey::Ed25519 { point } => {
                if point.len() != 32 {
                    return Err(CKR_ARGUMENTS_BAD)?;
                }
                (KeyAlgorithm::Ed25519, PublicKey::Ed25519 { point })
            }
        };
        Ok(Key {
            handle,
            algorithm,
            public,
        })
    }

    pub fn handle(&self) -> KeyHandle {
        self.handle
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn key_type(&self) -> CK_KEY_TYPE {
        self.algorithm.key_type()
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn signature_size(&self) -> usize {
        self.algorithm.signature_size()
    }

    /// Exact bit length of the RSA modulus, zero for non RSA keys
    pub fn modulus_bits(&self) -> usize {
        match &self.public {
            PublicKey::Rsa { modulus, .. } => modulus_bits(modulus),
            _ => 0,
        }
    }
}

fn modulus_bits(modulus: &[u8]) -> usize {
    match modulus.first() {
        Some(b) => {
            (modulus.len() - 1) * 8 + (8 - b.leading_zeros() as usize)
        }
        None => 0,
    }
}
