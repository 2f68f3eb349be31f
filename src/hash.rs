// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

use crate::error::Result;
use crate::mechanism::{Mechanism, Mechanisms};
use crate::operation::OperationContext;
use crate::pkcs11::*;

use openssl::hash::{Hasher, MessageDigest};

/// A concrete hash algorithm, usable as a digest mechanism or as the
/// hash/MGF sub-parameter of RSA mechanisms.
#[derive(Debug)]
pub struct HashSpec {
    pub mech: CK_MECHANISM_TYPE,
    pub mgf: CK_RSA_PKCS_MGF_TYPE,
    pub name: &'static str,
    pub size: usize,
    pub block_size: usize,
    md: fn() -> MessageDigest,
}

impl HashSpec {
    pub fn message_digest(&self) -> MessageDigest {
        (self.md)()
    }

    /// One shot digest of `data`
    pub fn digest(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(openssl::hash::hash(self.message_digest(), data)?.to_vec())
    }

    /// Digest of the concatenation of `parts`
    pub fn digest_parts(&self, parts: &[&[u8]]) -> Result<Vec<u8>> {
        let mut hasher = Hasher::new(self.message_digest())?;
        for p in parts {
            hasher.update(p)?;
        }
        Ok(hasher.finish()?.to_vec())
    }
}

pub static HASH_MECH_SET: [HashSpec; 5] = [
    HashSpec {
        mech: CKM_SHA_1,
        mgf: CKG_MGF1_SHA1,
        name: "SHA1",
        size: 20,
        block_size: 64,
        md: MessageDigest::sha1,
    },
    HashSpec {
        mech: CKM_SHA224,
        mgf: CKG_MGF1_SHA224,
        name: "SHA224",
        size: 28,
        block_size: 64,
        md: MessageDigest::sha224,
    },
    HashSpec {
        mech: CKM_SHA256,
        mgf: CKG_MGF1_SHA256,
        name: "SHA256",
        size: 32,
        block_size: 64,
        md: MessageDigest::sha256,
    },
    HashSpec {
        mech: CKM_SHA384,
        mgf: CKG_MGF1_SHA384,
        name: "SHA384",
        size: 48,
        block_size: 128,
        md: MessageDigest::sha384,
    },
    HashSpec {
        mech: CKM_SHA512,
        mgf: CKG_MGF1_SHA512,
        name: "SHA512",
        size: 64,
        block_size: 128,
        md: MessageDigest::sha512,
    },
];

/// Resolves a hash mechanism identifier (`CKM_SHA*`)
pub fn resolve(hash: CK_MECHANISM_TYPE) -> Option<&'static HashSpec> {
    HASH_MECH_SET.iter().find(|hs| hs.mech == hash)
}

/// Resolves an MGF1 identifier (`CKG_MGF1_SHA*`) to the hash it uses
pub fn resolve_mgf(mgf: CK_RSA_PKCS_MGF_TYPE) -> Option<&'static HashSpec> {
    HASH_MECH_SET.iter().find(|hs| hs.mgf == mgf)
}

#[derive(Debug)]
struct HashMechanism {
    info: CK_MECHANISM_INFO,
}

impl Mechanism for HashMechanism {
    fn info(&self) -> &CK_MECHANISM_INFO {
        &self.info
    }

    fn digest_new(&self, mech: &CkMechanism) -> Result<OperationContext> {
        if !mech.parameter.is_empty() {
            return Err(CKR_MECHANISM_PARAM_INVALID)?;
        }
        match resolve(mech.mechanism) {
            Some(hs) => OperationContext::digest(hs),
            None => Err(CKR_MECHANISM_INVALID)?,
        }
    }
}

pub fn register(mechs: &mut Mechanisms) {
    for hs in &HASH_MECH_SET {
        mechs.add_mechanism(
            hs.mech,
            Box::new(HashMechanism {
                info: CK_MECHANISM_INFO {
                    ulMinKeySize: 0,
                    ulMaxKeySize: 0,
                    flags: CKF_DIGEST,
                },
            }),
        );
    }
}
