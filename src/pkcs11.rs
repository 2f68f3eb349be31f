// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

//! Cryptoki constants and parameter structures used by the mechanism
//! engine.
//!
//! Only the subset of the PKCS#11 interface that the engine consumes is
//! declared here. Mechanism parameters travel as opaque byte blocks whose
//! layout is a sequence of native-endian `CK_ULONG` fields, optionally
//! followed by variable length data.

#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

pub type CK_ULONG = std::os::raw::c_ulong;
pub type CK_RV = CK_ULONG;
pub type CK_FLAGS = CK_ULONG;
pub type CK_MECHANISM_TYPE = CK_ULONG;
pub type CK_RSA_PKCS_MGF_TYPE = CK_ULONG;
pub type CK_RSA_PKCS_OAEP_SOURCE_TYPE = CK_ULONG;
pub type CK_KEY_TYPE = CK_ULONG;
pub type CK_SESSION_HANDLE = CK_ULONG;
pub type CK_OBJECT_HANDLE = CK_ULONG;

pub const CK_ULONG_SIZE: usize = std::mem::size_of::<CK_ULONG>();

/* Return values */
pub const CKR_OK: CK_RV = 0x0000;
pub const CKR_HOST_MEMORY: CK_RV = 0x0002;
pub const CKR_GENERAL_ERROR: CK_RV = 0x0005;
pub const CKR_FUNCTION_FAILED: CK_RV = 0x0006;
pub const CKR_ARGUMENTS_BAD: CK_RV = 0x0007;
pub const CKR_DATA_INVALID: CK_RV = 0x0020;
pub const CKR_DATA_LEN_RANGE: CK_RV = 0x0021;
pub const CKR_DEVICE_ERROR: CK_RV = 0x0030;
pub const CKR_ENCRYPTED_DATA_INVALID: CK_RV = 0x0040;
pub const CKR_ENCRYPTED_DATA_LEN_RANGE: CK_RV = 0x0041;
pub const CKR_KEY_HANDLE_INVALID: CK_RV = 0x0060;
pub const CKR_KEY_SIZE_RANGE: CK_RV = 0x0062;
pub const CKR_KEY_TYPE_INCONSISTENT: CK_RV = 0x0063;
pub const CKR_MECHANISM_INVALID: CK_RV = 0x0070;
pub const CKR_MECHANISM_PARAM_INVALID: CK_RV = 0x0071;
pub const CKR_OPERATION_ACTIVE: CK_RV = 0x0090;
pub const CKR_OPERATION_NOT_INITIALIZED: CK_RV = 0x0091;
pub const CKR_SESSION_HANDLE_INVALID: CK_RV = 0x00B3;
pub const CKR_SIGNATURE_INVALID: CK_RV = 0x00C0;
pub const CKR_SIGNATURE_LEN_RANGE: CK_RV = 0x00C1;
pub const CKR_USER_NOT_LOGGED_IN: CK_RV = 0x0101;
pub const CKR_CURVE_NOT_SUPPORTED: CK_RV = 0x0140;
pub const CKR_BUFFER_TOO_SMALL: CK_RV = 0x0150;

/* Key types */
pub const CKK_RSA: CK_KEY_TYPE = 0x0000;
pub const CKK_EC: CK_KEY_TYPE = 0x0003;
pub const CKK_EC_EDWARDS: CK_KEY_TYPE = 0x0040;

/* Mechanism flags */
pub const CKF_HW: CK_FLAGS = 0x0000_0001;
pub const CKF_ENCRYPT: CK_FLAGS = 0x0000_0100;
pub const CKF_DECRYPT: CK_FLAGS = 0x0000_0200;
pub const CKF_DIGEST: CK_FLAGS = 0x0000_0400;
pub const CKF_SIGN: CK_FLAGS = 0x0000_0800;
pub const CKF_VERIFY: CK_FLAGS = 0x0000_2000;
pub const CKF_GENERATE_KEY_PAIR: CK_FLAGS = 0x0001_0000;

/* Mechanisms */
pub const CKM_RSA_PKCS_KEY_PAIR_GEN: CK_MECHANISM_TYPE = 0x0000;
pub const CKM_RSA_PKCS: CK_MECHANISM_TYPE = 0x0001;
pub const CKM_RSA_X_509: CK_MECHANISM_TYPE = 0x0003;
pub const CKM_SHA1_RSA_PKCS: CK_MECHANISM_TYPE = 0x0006;
pub const CKM_RSA_PKCS_OAEP: CK_MECHANISM_TYPE = 0x0009;
pub const CKM_RSA_PKCS_PSS: CK_MECHANISM_TYPE = 0x000D;
pub const CKM_SHA1_RSA_PKCS_PSS: CK_MECHANISM_TYPE = 0x000E;
pub const CKM_SHA256_RSA_PKCS: CK_MECHANISM_TYPE = 0x0040;
pub const CKM_SHA384_RSA_PKCS: CK_MECHANISM_TYPE = 0x0041;
pub const CKM_SHA512_RSA_PKCS: CK_MECHANISM_TYPE = 0x0042;
pub const CKM_SHA256_RSA_PKCS_PSS: CK_MECHANISM_TYPE = 0x0043;
pub const CKM_SHA384_RSA_PKCS_PSS: CK_MECHANISM_TYPE = 0x0044;
pub const CKM_SHA512_RSA_PKCS_PSS: CK_MECHANISM_TYPE = 0x0045;
pub const CKM_SHA224_RSA_PKCS: CK_MECHANISM_TYPE = 0x0046;
pub const CKM_SHA224_RSA_PKCS_PSS: CK_MECHANISM_TYPE = 0x0047;
pub const CKM_SHA_1: CK_MECHANISM_TYPE = 0x0220;
pub const CKM_SHA256: CK_MECHANISM_TYPE = 0x0250;
pub const CKM_SHA224: CK_MECHANISM_TYPE = 0x0255;
pub const CKM_SHA384: CK_MECHANISM_TYPE = 0x0260;
pub const CKM_SHA512: CK_MECHANISM_TYPE = 0x0270;
pub const CKM_EC_KEY_PAIR_GEN: CK_MECHANISM_TYPE = 0x1040;
pub const CKM_ECDSA: CK_MECHANISM_TYPE = 0x1041;
pub const CKM_ECDSA_SHA1: CK_MECHANISM_TYPE = 0x1042;
pub const CKM_ECDSA_SHA224: CK_MECHANISM_TYPE = 0x1043;
pub const CKM_ECDSA_SHA256: CK_MECHANISM_TYPE = 0x1044;
pub const CKM_ECDSA_SHA384: CK_MECHANISM_TYPE = 0x1045;
pub const CKM_ECDSA_SHA512: CK_MECHANISM_TYPE = 0x1046;
pub const CKM_EC_EDWARDS_KEY_PAIR_GEN: CK_MECHANISM_TYPE = 0x1055;
pub const CKM_EC_MONTGOMERY_KEY_PAIR_GEN: CK_MECHANISM_TYPE = 0x1056;
pub const CKM_EDDSA: CK_MECHANISM_TYPE = 0x1057;

/* MGF1 identifiers */
pub const CKG_MGF1_SHA1: CK_RSA_PKCS_MGF_TYPE = 0x0001;
pub const CKG_MGF1_SHA256: CK_RSA_PKCS_MGF_TYPE = 0x0002;
pub const CKG_MGF1_SHA384: CK_RSA_PKCS_MGF_TYPE = 0x0003;
pub const CKG_MGF1_SHA512: CK_RSA_PKCS_MGF_TYPE = 0x0004;
pub const CKG_MGF1_SHA224: CK_RSA_PKCS_MGF_TYPE = 0x0005;

/* OAEP label source */
pub const CKZ_DATA_SPECIFIED: CK_RSA_PKCS_OAEP_SOURCE_TYPE = 0x0001;

static MECHANISM_NAMES: &[(CK_MECHANISM_TYPE, &str)] = &[
    (CKM_RSA_PKCS_KEY_PAIR_GEN, "CKM_RSA_PKCS_KEY_PAIR_GEN"),
    (CKM_RSA_PKCS, "CKM_RSA_PKCS"),
    (CKM_RSA_X_509, "CKM_RSA_X_509"),
    (CKM_SHA1_RSA_PKCS, "CKM_SHA1_RSA_PKCS"),
    (CKM_RSA_PKCS_OAEP, "CKM_RSA_PKCS_OAEP"),
    (CKM_RSA_PKCS_PSS, "CKM_RSA_PKCS_PSS"),
    (CKM_SHA1_RSA_PKCS_PSS, "CKM_SHA1_RSA_PKCS_PSS"),
    (CKM_SHA256_RSA_PKCS, "CKM_SHA256_RSA_PKCS"),
    (CKM_SHA384_RSA_PKCS, "CKM_SHA384_RSA_PKCS"),
    (CKM_SHA512_RSA_PKCS, "CKM_SHA512_RSA_PKCS"),
    (CKM_SHA256_RSA_PKCS_PSS, "CKM_SHA256_RSA_PKCS_PSS"),
    (CKM_SHA384_RSA_PKCS_PSS, "CKM_SHA384_RSA_PKCS_PSS"),
    (CKM_SHA512_RSA_PKCS_PSS, "CKM_SHA512_RSA_PKCS_PSS"),
    (CKM_SHA224_RSA_PKCS, "CKM_SHA224_RSA_PKCS"),
    (CKM_SHA224_RSA_PKCS_PSS, "CKM_SHA224_RSA_PKCS_PSS"),
    (CKM_SHA_1, "CKM_SHA_1"),
    (CKM_SHA256, "CKM_SHA256"),
    (CKM_SHA224, "CKM_SHA224"),
    (CKM_SHA384, "CKM_SHA384"),
    (CKM_SHA512, "CKM_SHA512"),
    (CKM_EC_KEY_PAIR_GEN, "CKM_EC_KEY_PAIR_GEN"),
    (CKM_ECDSA, "CKM_ECDSA"),
    (CKM_ECDSA_SHA1, "CKM_ECDSA_SHA1"),
    (CKM_ECDSA_SHA224, "CKM_ECDSA_SHA224"),
    (CKM_ECDSA_SHA256, "CKM_ECDSA_SHA256"),
    (CKM_ECDSA_SHA384, "CKM_ECDSA_SHA384"),
    (CKM_ECDSA_SHA512, "CKM_ECDSA_SHA512"),
    (CKM_EC_EDWARDS_KEY_PAIR_GEN, "CKM_EC_EDWARDS_KEY_PAIR_GEN"),
    (CKM_EC_MONTGOMERY_KEY_PAIR_GEN, "CKM_EC_MONTGOMERY_KEY_PAIR_GEN"),
    (CKM_EDDSA, "CKM_EDDSA"),
];

/// Returns the Cryptoki name of a mechanism, if known
pub fn mechanism_name(mech: CK_MECHANISM_TYPE) -> Option<&'static str> {
    MECHANISM_NAMES
        .iter()
        .find(|(m, _)| *m == mech)
        .map(|(_, n)| *n)
}

/// Returns the mechanism type for a Cryptoki name, if known
pub fn mechanism_from_name(name: &str) -> Option<CK_MECHANISM_TYPE> {
    MECHANISM_NAMES
        .iter()
        .find(|(_, n)| *n == name)
        .map(|(m, _)| *m)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CK_MECHANISM_INFO {
    pub ulMinKeySize: CK_ULONG,
    pub ulMaxKeySize: CK_ULONG,
    pub flags: CK_FLAGS,
}

/// A caller supplied mechanism descriptor: the mechanism type and its
/// parameter block, borrowed for the duration of an `*_init` call.
#[derive(Debug, Clone, Copy)]
pub struct CkMechanism<'a> {
    pub mechanism: CK_MECHANISM_TYPE,
    pub parameter: &'a [u8],
}

impl CkMechanism<'static> {
    pub fn new(mechanism: CK_MECHANISM_TYPE) -> CkMechanism<'static> {
        CkMechanism {
            mechanism,
            parameter: &[],
        }
    }
}

impl<'a> CkMechanism<'a> {
    pub fn with_param(
        mechanism: CK_MECHANISM_TYPE,
        parameter: &'a [u8],
    ) -> CkMechanism<'a> {
        CkMechanism {
            mechanism,
            parameter,
        }
    }
}

fn read_ulongs<const N: usize>(buf: &[u8]) -> Option<[CK_ULONG; N]> {
    if buf.len() < N * CK_ULONG_SIZE {
        return None;
    }
    let mut out = [0 as CK_ULONG; N];
    for (i, chunk) in buf.chunks_exact(CK_ULONG_SIZE).take(N).enumerate() {
        out[i] = CK_ULONG::from_ne_bytes(chunk.try_into().ok()?);
    }
    Some(out)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CK_RSA_PKCS_PSS_PARAMS {
    pub hashAlg: CK_MECHANISM_TYPE,
    pub mgf: CK_RSA_PKCS_MGF_TYPE,
    pub sLen: CK_ULONG,
}

impl CK_RSA_PKCS_PSS_PARAMS {
    pub const SIZE: usize = 3 * CK_ULONG_SIZE;

    /// Parses a parameter block, which must be exactly `SIZE` bytes
    pub fn from_bytes(buf: &[u8]) -> Option<CK_RSA_PKCS_PSS_PARAMS> {
        if buf.len() != Self::SIZE {
            return None;
        }
        let [hashAlg, mgf, sLen] = read_ulongs::<3>(buf)?;
        Some(CK_RSA_PKCS_PSS_PARAMS { hashAlg, mgf, sLen })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(Self::SIZE);
        v.extend_from_slice(&self.hashAlg.to_ne_bytes());
        v.extend_from_slice(&self.mgf.to_ne_bytes());
        v.extend_from_slice(&self.sLen.to_ne_bytes());
        v
    }
}

/// OAEP parameter block header. On the wire it is followed by exactly
/// `ulSourceDataLen` bytes of label data.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CK_RSA_PKCS_OAEP_PARAMS {
    pub hashAlg: CK_MECHANISM_TYPE,
    pub mgf: CK_RSA_PKCS_MGF_TYPE,
    pub source: CK_RSA_PKCS_OAEP_SOURCE_TYPE,
    pub ulSourceDataLen: CK_ULONG,
}

impl CK_RSA_PKCS_OAEP_PARAMS {
    pub const HEADER_SIZE: usize = 4 * CK_ULONG_SIZE;

    /// Parses a parameter block into its header and the trailing label.
    /// The block length must equal the header plus the declared label
    /// length.
    pub fn from_bytes(buf: &[u8]) -> Option<(CK_RSA_PKCS_OAEP_PARAMS, &[u8])> {
        let [hashAlg, mgf, source, ulSourceDataLen] = read_ulongs::<4>(buf)?;
        let label = &buf[Self::HEADER_SIZE..];
        if usize::try_from(ulSourceDataLen).ok()? != label.len() {
            return None;
        }
        Some((
            CK_RSA_PKCS_OAEP_PARAMS {
                hashAlg,
                mgf,
                source,
                ulSourceDataLen,
            },
            label,
        ))
    }

    pub fn to_bytes(&self, label: &[u8]) -> Vec<u8> {
        let mut v = Vec::with_capacity(Self::HEADER_SIZE + label.len());
        v.extend_from_slice(&self.hashAlg.to_ne_bytes());
        v.extend_from_slice(&self.mgf.to_ne_bytes());
        v.extend_from_slice(&self.source.to_ne_bytes());
        v.extend_from_slice(&self.ulSourceDataLen.to_ne_bytes());
        v.extend_from_slice(label);
        v
    }
}
