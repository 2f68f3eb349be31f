// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

//! ASN.1 structures used by the signature encodings

use crate::error::Result;
use crate::hash::HashSpec;
use crate::pkcs11::*;

pub const SHA1_OID: asn1::ObjectIdentifier = asn1::oid!(1, 3, 14, 3, 2, 26);
pub const SHA224_OID: asn1::ObjectIdentifier =
    asn1::oid!(2, 16, 840, 1, 101, 3, 4, 2, 4);
pub const SHA256_OID: asn1::ObjectIdentifier =
    asn1::oid!(2, 16, 840, 1, 101, 3, 4, 2, 1);
pub const SHA384_OID: asn1::ObjectIdentifier =
    asn1::oid!(2, 16, 840, 1, 101, 3, 4, 2, 2);
pub const SHA512_OID: asn1::ObjectIdentifier =
    asn1::oid!(2, 16, 840, 1, 101, 3, 4, 2, 3);

pub fn hash_oid(hs: &HashSpec) -> Result<asn1::ObjectIdentifier> {
    Ok(match hs.mech {
        CKM_SHA_1 => SHA1_OID,
        CKM_SHA224 => SHA224_OID,
        CKM_SHA256 => SHA256_OID,
        CKM_SHA384 => SHA384_OID,
        CKM_SHA512 => SHA512_OID,
        _ => return Err(CKR_MECHANISM_INVALID)?,
    })
}

/// AlgorithmIdentifier with the explicit NULL parameters PKCS#1
/// requires for the SHA family
#[derive(asn1::Asn1Read, asn1::Asn1Write, Debug, PartialEq, Eq)]
pub struct DigestAlgorithmIdentifier {
    pub oid: asn1::ObjectIdentifier,
    pub params: Option<asn1::Null>,
}

/// Defined in [RFC 8017](https://www.rfc-editor.org/rfc/rfc8017#section-9.2)
#[derive(asn1::Asn1Read, asn1::Asn1Write, Debug, PartialEq, Eq)]
pub struct DigestInfo<'a> {
    pub algorithm: DigestAlgorithmIdentifier,
    pub digest: &'a [u8],
}

impl DigestInfo<'_> {
    pub fn new<'a>(hs: &HashSpec, digest: &'a [u8]) -> Result<DigestInfo<'a>> {
        if digest.len() != hs.size {
            return Err(CKR_DATA_LEN_RANGE)?;
        }
        Ok(DigestInfo {
            algorithm: DigestAlgorithmIdentifier {
                oid: hash_oid(hs)?,
                params: Some(()),
            },
            digest,
        })
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        match asn1::write_single(self) {
            Ok(der) => Ok(der),
            Err(_) => Err(CKR_GENERAL_ERROR)?,
        }
    }
}

/// ECDSA-Sig-Value as defined in
/// [RFC 3279](https://www.rfc-editor.org/rfc/rfc3279#section-2.2.3)
#[derive(asn1::Asn1Read, asn1::Asn1Write, Debug)]
pub struct EcdsaSignature<'a> {
    pub r: asn1::BigUint<'a>,
    pub s: asn1::BigUint<'a>,
}

/// Minimal non negative INTEGER content for a big endian unsigned value:
/// leading zero bytes are dropped and a single zero byte is prepended
/// when the high bit of the first remaining byte is set.
pub fn der_uint_bytes(val: &[u8]) -> Vec<u8> {
    let skip = val.iter().take_while(|b| **b == 0).count();
    let val = &val[skip..];
    let mut v = Vec::with_capacity(val.len() + 1);
    match val.first() {
        None => v.push(0),
        Some(b) if b & 0x80 != 0 => {
            v.push(0);
            v.extend_from_slice(val);
        }
        Some(_) => v.extend_from_slice(val),
    }
    v
}
