// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::config::Config;
use crate::error::Result;
use crate::key::Key;
use crate::operation::OperationContext;
use crate::pkcs11::*;
use crate::token::Token;
use crate::{ecdsa, eddsa, hash, rsa};

use log::debug;

/// A registered mechanism. Each `*_new` method validates the mechanism
/// parameters against the key and returns a ready Operation Context;
/// families a mechanism does not support keep the default rejection.
pub trait Mechanism: Debug + Send + Sync {
    fn info(&self) -> &CK_MECHANISM_INFO;

    fn sign_new(
        &self,
        _: &CkMechanism,
        _: Option<&Key>,
    ) -> Result<OperationContext> {
        Err(CKR_MECHANISM_INVALID)?
    }

    fn verify_new(
        &self,
        _: &CkMechanism,
        _: Option<&Key>,
    ) -> Result<OperationContext> {
        Err(CKR_MECHANISM_INVALID)?
    }

    fn digest_new(&self, _: &CkMechanism) -> Result<OperationContext> {
        Err(CKR_MECHANISM_INVALID)?
    }

    fn decryption_new(
        &self,
        _: &CkMechanism,
        _: Option<&Key>,
    ) -> Result<OperationContext> {
        Err(CKR_MECHANISM_INVALID)?
    }
}

#[derive(Debug)]
pub struct Mechanisms {
    tree: BTreeMap<CK_MECHANISM_TYPE, Box<dyn Mechanism>>,
}

impl Default for Mechanisms {
    fn default() -> Self {
        Self::new()
    }
}

impl Mechanisms {
    pub fn new() -> Mechanisms {
        Mechanisms {
            tree: BTreeMap::new(),
        }
    }

    /// Registers every supported mechanism, minus the ones the
    /// configuration denies
    pub fn from_config(conf: &Config) -> Result<Mechanisms> {
        let mut mechs = Mechanisms::new();
        hash::register(&mut mechs);
        rsa::register(&mut mechs, conf);
        ecdsa::register(&mut mechs, conf);
        eddsa::register(&mut mechs, conf);
        for m in conf.denied_mechanisms()? {
            if mechs.remove(m) {
                debug!("mechanism {:#x} disabled by configuration", m);
            }
        }
        Ok(mechs)
    }

    pub fn add_mechanism(
        &mut self,
        typ: CK_MECHANISM_TYPE,
        info: Box<dyn Mechanism>,
    ) {
        self.tree.insert(typ, info);
    }

    pub fn remove(&mut self, typ: CK_MECHANISM_TYPE) -> bool {
        self.tree.remove(&typ).is_some()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn list(&self) -> Vec<CK_MECHANISM_TYPE> {
        self.tree.keys().cloned().collect()
    }

    pub fn info(&self, typ: CK_MECHANISM_TYPE) -> Option<&CK_MECHANISM_INFO> {
        self.tree.get(&typ).map(|m| m.info())
    }

    pub fn get(&self, typ: CK_MECHANISM_TYPE) -> Result<&dyn Mechanism> {
        match self.tree.get(&typ) {
            Some(m) => Ok(m.as_ref()),
            None => Err(CKR_MECHANISM_INVALID)?,
        }
    }
}

/// Key pair generation mechanisms the engine knows how to drive
pub static GENERATION_MECHANISMS: [CK_MECHANISM_TYPE; 4] = [
    CKM_RSA_PKCS_KEY_PAIR_GEN,
    CKM_EC_KEY_PAIR_GEN,
    CKM_EC_EDWARDS_KEY_PAIR_GEN,
    CKM_EC_MONTGOMERY_KEY_PAIR_GEN,
];

/// Checks a key generation mechanism is supported here and advertised
/// by the token
pub fn check_generation_mechanism(
    mech: CK_MECHANISM_TYPE,
    token: &dyn Token,
) -> Result<()> {
    if !GENERATION_MECHANISMS.contains(&mech) {
        return Err(CKR_MECHANISM_INVALID)?;
    }
    match token.mechanism_info(mech) {
        Some(_) => Ok(()),
        None => {
            debug!("token does not advertise mechanism {:#x}", mech);
            Err(CKR_MECHANISM_INVALID)?
        }
    }
}
