// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

use crate::config::Config;
use crate::error::Result;
use crate::hash::{self, HashSpec};
use crate::key::Key;
use crate::mechanism::{Mechanism, Mechanisms};
use crate::operation::OperationContext;
use crate::padding::{pss_max_salt_len, PaddingScheme};
use crate::pkcs11::*;

use log::debug;

pub const MIN_RSA_SIZE_BITS: CK_ULONG = 1024;
pub const MAX_RSA_SIZE_BITS: CK_ULONG = 4096;

static RSA_SIGN_MECHS: [CK_MECHANISM_TYPE; 13] = [
    CKM_RSA_X_509,
    CKM_RSA_PKCS,
    CKM_SHA1_RSA_PKCS,
    CKM_SHA224_RSA_PKCS,
    CKM_SHA256_RSA_PKCS,
    CKM_SHA384_RSA_PKCS,
    CKM_SHA512_RSA_PKCS,
    CKM_RSA_PKCS_PSS,
    CKM_SHA1_RSA_PKCS_PSS,
    CKM_SHA224_RSA_PKCS_PSS,
    CKM_SHA256_RSA_PKCS_PSS,
    CKM_SHA384_RSA_PKCS_PSS,
    CKM_SHA512_RSA_PKCS_PSS,
];

/// Hash implied by the mechanism itself, None for the raw variants
fn mech_hash(mech: CK_MECHANISM_TYPE) -> Result<Option<&'static HashSpec>> {
    let hash = match mech {
        CKM_RSA_X_509 | CKM_RSA_PKCS | CKM_RSA_PKCS_PSS
        | CKM_RSA_PKCS_OAEP => return Ok(None),
        CKM_SHA1_RSA_PKCS | CKM_SHA1_RSA_PKCS_PSS => CKM_SHA_1,
        CKM_SHA224_RSA_PKCS | CKM_SHA224_RSA_PKCS_PSS => CKM_SHA224,
        CKM_SHA256_RSA_PKCS | CKM_SHA256_RSA_PKCS_PSS => CKM_SHA256,
        CKM_SHA384_RSA_PKCS | CKM_SHA384_RSA_PKCS_PSS => CKM_SHA384,
        CKM_SHA512_RSA_PKCS | CKM_SHA512_RSA_PKCS_PSS => CKM_SHA512,
        _ => return Err(CKR_MECHANISM_INVALID)?,
    };
    match hash::resolve(hash) {
        Some(hs) => Ok(Some(hs)),
        None => Err(CKR_MECHANISM_INVALID)?,
    }
}

fn is_pss(mech: CK_MECHANISM_TYPE) -> bool {
    matches!(
        mech,
        CKM_RSA_PKCS_PSS
            | CKM_SHA1_RSA_PKCS_PSS
            | CKM_SHA224_RSA_PKCS_PSS
            | CKM_SHA256_RSA_PKCS_PSS
            | CKM_SHA384_RSA_PKCS_PSS
            | CKM_SHA512_RSA_PKCS_PSS
    )
}

fn check_key(key: Option<&Key>) -> Result<&Key> {
    match key {
        Some(k) if k.key_type() == CKK_RSA => Ok(k),
        _ => Err(CKR_KEY_TYPE_INCONSISTENT)?,
    }
}

fn no_params(mech: &CkMechanism) -> Result<()> {
    if mech.parameter.is_empty() {
        Ok(())
    } else {
        Err(CKR_MECHANISM_PARAM_INVALID)?
    }
}

pub fn parse_pss_params(
    mech: &CkMechanism,
    implied: Option<&HashSpec>,
    key: &Key,
    strict_salt: bool,
) -> Result<PaddingScheme> {
    let Some(params) = CK_RSA_PKCS_PSS_PARAMS::from_bytes(mech.parameter)
    else {
        return Err(CKR_MECHANISM_PARAM_INVALID)?;
    };
    let (Some(hash), Some(mgf)) =
        (hash::resolve(params.hashAlg), hash::resolve_mgf(params.mgf))
    else {
        return Err(CKR_MECHANISM_PARAM_INVALID)?;
    };
    if let Some(ih) = implied {
        if ih.mech != hash.mech {
            debug!(
                "PSS hash {} does not match mechanism hash {}",
                hash.name, ih.name
            );
            return Err(CKR_ARGUMENTS_BAD)?;
        }
    }
    let Ok(salt_len) = usize::try_from(params.sLen) else {
        return Err(CKR_MECHANISM_PARAM_INVALID)?;
    };
    if salt_len > pss_max_salt_len(hash, key.modulus_bits())
        || (strict_salt && salt_len > hash.size)
    {
        return Err(CKR_MECHANISM_PARAM_INVALID)?;
    }
    Ok(PaddingScheme::Pss {
        hash,
        mgf,
        salt_len,
    })
}

pub fn parse_oaep_params(
    mech: &CkMechanism,
    key: &Key,
) -> Result<PaddingScheme> {
    let Some((params, source)) =
        CK_RSA_PKCS_OAEP_PARAMS::from_bytes(mech.parameter)
    else {
        return Err(CKR_MECHANISM_PARAM_INVALID)?;
    };
    let (Some(hash), Some(mgf)) =
        (hash::resolve(params.hashAlg), hash::resolve_mgf(params.mgf))
    else {
        return Err(CKR_MECHANISM_PARAM_INVALID)?;
    };
    let label = match params.source {
        0 if source.is_empty() => Vec::new(),
        CKZ_DATA_SPECIFIED => source.to_vec(),
        _ => return Err(CKR_MECHANISM_PARAM_INVALID)?,
    };
    if key.signature_size() < 2 * hash.size + 2 {
        debug!(
            "OAEP with {} does not fit a {} bit modulus",
            hash.name,
            key.modulus_bits()
        );
        return Err(CKR_MECHANISM_PARAM_INVALID)?;
    }
    Ok(PaddingScheme::Oaep { hash, mgf, label })
}

#[derive(Debug)]
struct RsaMechanism {
    info: CK_MECHANISM_INFO,
    strict_pss_salt: bool,
}

impl RsaMechanism {
    fn sign_padding(
        &self,
        mech: &CkMechanism,
        implied: Option<&HashSpec>,
        key: &Key,
    ) -> Result<PaddingScheme> {
        if is_pss(mech.mechanism) {
            return parse_pss_params(mech, implied, key, self.strict_pss_salt);
        }
        no_params(mech)?;
        match mech.mechanism {
            CKM_RSA_X_509 => Ok(PaddingScheme::None),
            _ => Ok(PaddingScheme::Pkcs1v15),
        }
    }
}

impl Mechanism for RsaMechanism {
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
        let key = check_key(key)?;
        let hash = mech_hash(mech.mechanism)?;
        let padding = self.sign_padding(mech, hash, key)?;
        OperationContext::sign(
            mech.mechanism,
            key,
            hash,
            padding,
            key.signature_size(),
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
        let key = check_key(key)?;
        let hash = mech_hash(mech.mechanism)?;
        let padding = self.sign_padding(mech, hash, key)?;
        OperationContext::verify(
            mech.mechanism,
            key,
            hash,
            padding,
            key.signature_size(),
        )
    }

    fn decryption_new(
        &self,
        mech: &CkMechanism,
        key: Option<&Key>,
    ) -> Result<OperationContext> {
        if self.info.flags & CKF_DECRYPT != CKF_DECRYPT {
            return Err(CKR_MECHANISM_INVALID)?;
        }
        let key = check_key(key)?;
        let padding = match mech.mechanism {
            CKM_RSA_X_509 => {
                no_params(mech)?;
                PaddingScheme::None
            }
            CKM_RSA_PKCS => {
                no_params(mech)?;
                PaddingScheme::Pkcs1v15
            }
            CKM_RSA_PKCS_OAEP => parse_oaep_params(mech, key)?,
            _ => return Err(CKR_MECHANISM_INVALID)?,
        };
        OperationContext::decrypt(mech.mechanism, key, padding)
    }
}

pub fn register(mechs: &mut Mechanisms, conf: &Config) {
    for ckm in &RSA_SIGN_MECHS {
        let mut flags = CKF_HW | CKF_SIGN | CKF_VERIFY;
        if *ckm == CKM_RSA_X_509 || *ckm == CKM_RSA_PKCS {
            flags |= CKF_DECRYPT;
        }
        mechs.add_mechanism(
            *ckm,
            Box::new(RsaMechanism {
                info: CK_MECHANISM_INFO {
                    ulMinKeySize: MIN_RSA_SIZE_BITS,
                    ulMaxKeySize: MAX_RSA_SIZE_BITS,
                    flags,
                },
                strict_pss_salt: conf.strict_pss_salt,
            }),
        );
    }
    mechs.add_mechanism(
        CKM_RSA_PKCS_OAEP,
        Box::new(RsaMechanism {
            info: CK_MECHANISM_INFO {
                ulMinKeySize: MIN_RSA_SIZE_BITS,
                ulMaxKeySize: MAX_RSA_SIZE_BITS,
                flags: CKF_HW | CKF_DECRYPT,
            },
            strict_pss_salt: conf.strict_pss_salt,
        }),
    );
}
