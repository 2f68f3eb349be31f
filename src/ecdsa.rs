// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

use crate::config::Config;
use crate::error::Result;
use crate::hash::{self, HashSpec};
use crate::key::Key;
use crate::mechanism::{Mechanism, Mechanisms};
use crate::operation::OperationContext;
use crate::padding::PaddingScheme;
use crate::pkcs11::*;

pub const MIN_EC_SIZE_BITS: CK_ULONG = 256;
pub const MAX_EC_SIZE_BITS: CK_ULONG = 384;

static ECDSA_MECHS: [CK_MECHANISM_TYPE; 6] = [
    CKM_ECDSA,
    CKM_ECDSA_SHA1,
    CKM_ECDSA_SHA224,
    CKM_ECDSA_SHA256,
    CKM_ECDSA_SHA384,
    CKM_ECDSA_SHA512,
];

fn mech_hash(mech: CK_MECHANISM_TYPE) -> Result<Option<&'static HashSpec>> {
    let hash = match mech {
        CKM_ECDSA => return Ok(None),
        CKM_ECDSA_SHA1 => CKM_SHA_1,
        CKM_ECDSA_SHA224 => CKM_SHA224,
        CKM_ECDSA_SHA256 => CKM_SHA256,
        CKM_ECDSA_SHA384 => CKM_SHA384,
        CKM_ECDSA_SHA512 => CKM_SHA512,
        _ => return Err(CKR_MECHANISM_INVALID)?,
    };
    match hash::resolve(hash) {
        Some(hs) => Ok(Some(hs)),
        None => Err(CKR_MECHANISM_INVALID)?,
    }
}

/* ECDSA mechanisms take no parameters */
fn check_args<'a>(mech: &CkMechanism, key: Option<&'a Key>) -> Result<&'a Key> {
    let key = match key {
        Some(k) if k.key_type() == CKK_EC => k,
        _ => return Err(CKR_KEY_TYPE_INCONSISTENT)?,
    };
    if !mech.parameter.is_empty() {
        return Err(CKR_MECHANISM_PARAM_INVALID)?;
    }
    Ok(key)
}

#[derive(Debug)]
struct EcdsaMechanism {
    info: CK_MECHANISM_INFO,
    raw_buffer_size: usize,
}

impl Mechanism for EcdsaMechanism {
    fn info(&self) -> &CK_MECHANISM_INFO {
        &self.info
    }

    fn sign_new(
        &self,
        mech: &CkMechanism,
        key: Option<&Key>,
    ) -> Result<OperationContext> {
        if self.info.flags & CKF_SIGN != CKF_SIGN {
            return Err(CKR_MECHANISM_INVALID)?;
        }
        let key = check_args(mech, key)?;
        OperationContext::sign(
            mech.mechanism,
            key,
            mech_hash(mech.mechanism)?,
            PaddingScheme::None,
            self.raw_buffer_size,
        )
    }

    fn verify_new(
        &self,
        mech: &CkMechanism,
        key: Option<&Key>,
    ) -> Result<OperationContext> {
        if self.info.flags & CKF_VERIFY != CKF_VERIFY {
            return Err(CKR_MECHANISM_INVALID)?;
        }
        let key = check_args(mech, key)?;
        OperationContext::verify(
            mech.mechanism,
            key,
            mech_hash(mech.mechanism)?,
            PaddingScheme::None,
            self.raw_buffer_size,
        )
    }
}

pub fn register(mechs: &mut Mechanisms, conf: &Config) {
    for ckm in &ECDSA_MECHS {
        mechs.add_mechanism(
            *ckm,
            Box::new(EcdsaMechanism {
                info: CK_MECHANISM_INFO {
                    ulMinKeySize: MIN_EC_SIZE_BITS,
                    ulMaxKeySize: MAX_EC_SIZE_BITS,
                    flags: CKF_HW | CKF_SIGN | CKF_VERIFY,
                },
                raw_buffer_size: conf.raw_buffer_size,
            }),
        );
    }
}
