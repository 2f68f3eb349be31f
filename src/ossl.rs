// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

//! Local public key operations backed by OpenSSL.
//!
//! Verification never involves the token: the public half of every key
//! is available from the object store and is checked here.

use crate::error::{Error, Result};
use crate::key::EcCurve;
use crate::map_err;
use crate::pkcs11::*;

use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey, EcPoint};
use openssl::ecdsa::EcdsaSig;
use openssl::pkey::{Id, PKey};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::Verifier;

/// Raw RSA public key operation (`s^e mod n`) over a modulus sized
/// input. An input the key cannot process is an invalid signature.
pub fn rsa_public_raw(
    modulus: &[u8],
    exponent: &[u8],
    input: &[u8],
) -> Result<Vec<u8>> {
    let n = map_err!(BigNum::from_slice(modulus), CKR_FUNCTION_FAILED)?;
    let e = map_err!(BigNum::from_slice(exponent), CKR_FUNCTION_FAILED)?;
    let rsa = map_err!(Rsa::from_public_components(n, e), CKR_FUNCTION_FAILED)?;
    let k = usize::try_from(rsa.size())?;
    if input.len() != k {
        return Err(CKR_SIGNATURE_LEN_RANGE)?;
    }
    let mut out = vec![0u8; k];
    let len = map_err!(
        rsa.public_decrypt(input, &mut out, Padding::NONE),
        CKR_SIGNATURE_INVALID
    )?;
    out.truncate(len);
    Ok(out)
}

fn ec_public_key(
    curve: EcCurve,
    point: &[u8],
) -> Result<EcKey<openssl::pkey::Public>> {
    let group = EcGroup::from_curve_name(curve.nid())?;
    let mut ctx = BigNumContext::new()?;
    let pt = EcPoint::from_bytes(&group, point, &mut ctx)?;
    Ok(EcKey::from_public_key(&group, &pt)?)
}

/// Verifies a DER encoded ECDSA signature over `digest`
pub fn ecdsa_verify(
    curve: EcCurve,
    point: &[u8],
    digest: &[u8],
    der: &[u8],
) -> Result<()> {
    let key = ec_public_key(curve, point)?;
    let sig = map_err!(EcdsaSig::from_der(der), CKR_SIGNATURE_INVALID)?;
    match sig.verify(digest, &key) {
        Ok(true) => Ok(()),
        Ok(false) => Err(CKR_SIGNATURE_INVALID)?,
        Err(e) => Err(Error::ck_rv_from_error(CKR_FUNCTION_FAILED, e)),
    }
}

/// Verifies a pure Ed25519 signature over the whole message
pub fn eddsa_verify(point: &[u8], msg: &[u8], sig: &[u8]) -> Result<()> {
    let pkey = PKey::public_key_from_raw_bytes(point, Id::ED25519)?;
    let mut verifier = Verifier::new_without_digest(&pkey)?;
    match verifier.verify_oneshot(sig, msg) {
        Ok(true) => Ok(()),
        Ok(false) => Err(CKR_SIGNATURE_INVALID)?,
        Err(e) => Err(Error::ck_rv_from_error(CKR_FUNCTION_FAILED, e)),
    }
}
