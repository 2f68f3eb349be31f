// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

//! Pure Ed25519. The token signs the whole message in a single call, so
//! the message is always buffered rather than hashed.

use crate::config::Config;
use crate::error::Result;
use crate::key::Key;
use crate::mechanism::{Mechanism, Mechanisms};
use crate::operation::OperationContext;
use crate::padding::PaddingScheme;
use crate::pkcs11::*;

pub const ED25519_SIZE_BITS: CK_ULONG = 255;

/* Prehashed or context variants (CK_EDDSA_PARAMS) are not offered by
 * the token, only the empty parameter form is accepted */
fn check_args<'a>(mech: &CkMechanism, key: Option<&'a Key>) -> Result<&'a Key> {
    let key = match key {
        Some(k) if k.key_type() == CKK_EC_EDWARDS => k,
        _ => return Err(CKR_KEY_TYPE_INCONSISTENT)?,
    };
    if !mech.parameter.is_empty() {
        return Err(CKR_MECHANISM_PARAM_INVALID)?;
    }
    Ok(key)
}

#[derive(Debug)]
struct EddsaMechanism {
    info: CK_MECHANISM_INFO,
    raw_buffer_size: usize,
}

impl Mechanism for EddsaMechanism {
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
            None,
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
            None,
            PaddingScheme::None,
            self.raw_buffer_size,
        )
    }
}

pub fn register(mechs: &mut Mechanisms, conf: &Config) {
    mechs.add_mechanism(
        CKM_EDDSA,
        Box::new(EddsaMechanism {
            info: CK_MECHANISM_INFO {
                ulMinKeySize: ED25519_SIZE_BITS,
                ulMaxKeySize: ED25519_SIZE_BITS,
                flags: CKF_HW | CKF_SIGN | CKF_VERIFY,
            },
            raw_buffer_size: conf.raw_buffer_size,
        }),
    );
}
