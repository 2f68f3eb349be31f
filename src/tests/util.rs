// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

use crate::tests::*;

macro_rules! ret_or_panic {
    ($ret:expr) => {
        match $ret {
            Ok(r) => r,
            Err(e) => panic!("{e}"),
        }
    };
}

/// Return code of a result, CKR_OK on success
pub fn ret_rv<T>(ret: Result<T>) -> CK_RV {
    match ret {
        Ok(_) => CKR_OK,
        Err(e) => e.rv(),
    }
}

pub fn pss_params(
    hash: CK_MECHANISM_TYPE,
    mgf: CK_RSA_PKCS_MGF_TYPE,
    salt_len: usize,
) -> Vec<u8> {
    CK_RSA_PKCS_PSS_PARAMS {
        hashAlg: hash,
        mgf,
        sLen: salt_len as CK_ULONG,
    }
    .to_bytes()
}

pub fn oaep_params(
    hash: CK_MECHANISM_TYPE,
    mgf: CK_RSA_PKCS_MGF_TYPE,
    label: &[u8],
) -> Vec<u8> {
    let source = if label.is_empty() { 0 } else { CKZ_DATA_SPECIFIED };
    CK_RSA_PKCS_OAEP_PARAMS {
        hashAlg: hash,
        mgf,
        source,
        ulSourceDataLen: label.len() as CK_ULONG,
    }
    .to_bytes(label)
}

pub fn sha256() -> &'static HashSpec {
    ret_or_panic!(hash::resolve(CKM_SHA256).ok_or("no sha256"))
}

pub fn sha1() -> &'static HashSpec {
    ret_or_panic!(hash::resolve(CKM_SHA_1).ok_or("no sha1"))
}
