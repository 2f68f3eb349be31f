// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

//! The hardware token as seen by the mechanism engine.
//!
//! Private key material never leaves the device; the engine only ever
//! asks it to run a raw private key primitive over data it has already
//! hashed and padded. Implementations are responsible for serializing
//! access to the physical device. Calls may block for as long as the
//! device needs (for example while waiting for a touch confirmation).

use std::fmt;

use crate::key::{KeyAlgorithm, KeyHandle};
use crate::pkcs11::{CK_MECHANISM_INFO, CK_MECHANISM_TYPE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The device needs a PIN or a physical touch before proceeding
    AuthenticationRequired,
    /// Hardware or transport fault
    Device(String),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TokenError::AuthenticationRequired => {
                write!(f, "token requires authentication")
            }
            TokenError::Device(msg) => write!(f, "token device error: {}", msg),
        }
    }
}

impl std::error::Error for TokenError {}

pub type TokenResult<T> = std::result::Result<T, TokenError>;

pub trait Token {
    /// Runs the raw private key signature primitive.
    ///
    /// For RSA keys `data` is a block exactly as long as the modulus and
    /// the result is the raw RSA output. For EC keys `data` is a digest
    /// (or raw data) and the result is a DER encoded ECDSA-Sig-Value. For
    /// Ed25519 keys `data` is the whole message and the result is the
    /// 64 byte signature.
    fn sign(
        &self,
        data: &[u8],
        algorithm: KeyAlgorithm,
        key: KeyHandle,
    ) -> TokenResult<Vec<u8>>;

    /// Runs the raw RSA private key primitive, returning the padded
    /// plaintext block.
    fn decrypt(
        &self,
        ciphertext: &[u8],
        algorithm: KeyAlgorithm,
        key: KeyHandle,
    ) -> TokenResult<Vec<u8>>;

    /// Mechanisms the device advertises, if it supports `mech` at all
    fn mechanism_info(
        &self,
        mech: CK_MECHANISM_TYPE,
    ) -> Option<CK_MECHANISM_INFO>;
}
