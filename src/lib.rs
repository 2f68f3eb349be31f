// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

//! This is pivmech
//!
//! The mechanism engine of a PKCS#11 provider for PIV hardware tokens.
//! It turns a mechanism and its parameters into the hashing, padding and
//! raw private key steps needed to sign, verify, digest or decrypt, with
//! the private key steps delegated to a [Token].

pub mod accumulator;
pub mod config;
pub mod error;
pub mod hash;
pub mod kasn1;
pub mod key;
pub mod mechanism;
pub mod operation;
pub mod ossl;
pub mod padding;
pub mod pkcs11;
pub mod session;
pub mod token;

mod ecdsa;
mod eddsa;
mod rsa;

#[cfg(feature = "log")]
pub mod trace;

use std::sync::Once;

pub use config::Config;
pub use error::{Error, Result};
pub use key::{EcCurve, Key, KeyAlgorithm, KeyHandle, PublicKey};
pub use token::{Token, TokenError, TokenResult};

use mechanism::Mechanisms;
use operation::OperationKind;
use pkcs11::*;
use session::Sessions;

use log::debug;

static LOG_INIT: Once = Once::new();

fn log_init() {
    LOG_INIT.call_once(|| {
        #[cfg(feature = "log")]
        trace::log_init();
    });
}

fn mech_name(mech: CK_MECHANISM_TYPE) -> String {
    match mechanism_name(mech) {
        Some(n) => n.to_string(),
        None => format!("{:#x}", mech),
    }
}

/// Wires the mechanism registry, the sessions and the token together.
///
/// Every operation family follows the same shape: `*_init` selects the
/// mechanism and fails with CKR_OPERATION_ACTIVE if the session already
/// has a live operation, `*_update` feeds data, `*_final` produces the
/// result and ends the operation. The one shot forms do update and final
/// in a single call.
pub struct Provider<T: Token> {
    token: T,
    mechanisms: Mechanisms,
    sessions: Sessions,
}

impl<T: Token> Provider<T> {
    pub fn new(token: T, conf: &Config) -> Result<Provider<T>> {
        log_init();
        let mechanisms = Mechanisms::from_config(conf)?;
        debug!("registered {} mechanisms", mechanisms.len());
        Ok(Provider {
            token,
            mechanisms,
            sessions: Sessions::new(),
        })
    }

    pub fn token(&self) -> &T {
        &self.token
    }

    pub fn open_session(&mut self) -> CK_SESSION_HANDLE {
        self.sessions.open()
    }

    pub fn close_session(&mut self, session: CK_SESSION_HANDLE) -> Result<()> {
        self.sessions.close(session)
    }

    pub fn mechanism_list(&self) -> Vec<CK_MECHANISM_TYPE> {
        self.mechanisms.list()
    }

    pub fn mechanism_info(
        &self,
        mech: CK_MECHANISM_TYPE,
    ) -> Result<CK_MECHANISM_INFO> {
        match self.mechanisms.info(mech) {
            Some(info) => Ok(*info),
            None => Err(CKR_MECHANISM_INVALID)?,
        }
    }

    pub fn check_generation_mechanism(
        &self,
        mech: CK_MECHANISM_TYPE,
    ) -> Result<()> {
        mechanism::check_generation_mechanism(mech, &self.token)
    }

    /// Drops whatever operation the session holds
    pub fn cancel(&mut self, session: CK_SESSION_HANDLE) -> Result<()> {
        self.sessions.get_mut(session)?.cancel();
        Ok(())
    }

    /* Sign */

    pub fn sign_init(
        &mut self,
        session: CK_SESSION_HANDLE,
        mech: &CkMechanism,
        key: Option<&Key>,
    ) -> Result<()> {
        let sess = self.sessions.get_mut(session)?;
        if sess.has_operation() {
            return Err(CKR_OPERATION_ACTIVE)?;
        }
        debug!("sign init: {}", mech_name(mech.mechanism));
        let op = self.mechanisms.get(mech.mechanism)?.sign_new(mech, key)?;
        sess.set_operation(op)
    }

    pub fn sign_update(
        &mut self,
        session: CK_SESSION_HANDLE,
        data: &[u8],
    ) -> Result<()> {
        self.sessions
            .get_mut(session)?
            .run(OperationKind::Sign, |op| op.update(data))
    }

    /// Length of the signature the active sign operation will produce
    pub fn sign_len(&mut self, session: CK_SESSION_HANDLE) -> Result<usize> {
        self.sessions
            .get_mut(session)?
            .run(OperationKind::Sign, |op| Ok(op.output_len()))
    }

    pub fn sign_final(
        &mut self,
        session: CK_SESSION_HANDLE,
        out: &mut [u8],
    ) -> Result<usize> {
        let token = &self.token;
        self.sessions
            .get_mut(session)?
            .run(OperationKind::Sign, |op| op.sign_final(token, out))
    }

    pub fn sign(
        &mut self,
        session: CK_SESSION_HANDLE,
        data: &[u8],
        out: &mut [u8],
    ) -> Result<usize> {
        let token = &self.token;
        self.sessions
            .get_mut(session)?
            .run(OperationKind::Sign, |op| {
                if out.len() < op.output_len() {
                    return Err(Error::buf_too_small(op.output_len()));
                }
                op.update(data)?;
                op.sign_final(token, out)
            })
    }

    /* Verify */

    pub fn verify_init(
        &mut self,
        session: CK_SESSION_HANDLE,
        mech: &CkMechanism,
        key: Option<&Key>,
    ) -> Result<()> {
        let sess = self.sessions.get_mut(session)?;
        if sess.has_operation() {
            return Err(CKR_OPERATION_ACTIVE)?;
        }
        debug!("verify init: {}", mech_name(mech.mechanism));
        let op = self.mechanisms.get(mech.mechanism)?.verify_new(mech, key)?;
        sess.set_operation(op)
    }

    pub fn verify_update(
        &mut self,
        session: CK_SESSION_HANDLE,
        data: &[u8],
    ) -> Result<()> {
        self.sessions
            .get_mut(session)?
            .run(OperationKind::Verify, |op| op.update(data))
    }

    pub fn verify_final(
        &mut self,
        session: CK_SESSION_HANDLE,
        signature: &[u8],
    ) -> Result<()> {
        self.sessions
            .get_mut(session)?
            .run(OperationKind::Verify, |op| op.verify_final(signature))
    }

    pub fn verify(
        &mut self,
        session: CK_SESSION_HANDLE,
        data: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        self.sessions
            .get_mut(session)?
            .run(OperationKind::Verify, |op| {
                op.update(data)?;
                op.verify_final(signature)
            })
    }

    /* Digest */

    pub fn digest_init(
        &mut self,
        session: CK_SESSION_HANDLE,
        mech: &CkMechanism,
    ) -> Result<()> {
        let sess = self.sessions.get_mut(session)?;
        if sess.has_operation() {
            return Err(CKR_OPERATION_ACTIVE)?;
        }
        debug!("digest init: {}", mech_name(mech.mechanism));
        let m = self.mechanisms.get(mech.mechanism)?;
        if m.info().flags & CKF_DIGEST != CKF_DIGEST {
            return Err(CKR_MECHANISM_INVALID)?;
        }
        let op = m.digest_new(mech)?;
        sess.set_operation(op)
    }

    pub fn digest_update(
        &mut self,
        session: CK_SESSION_HANDLE,
        data: &[u8],
    ) -> Result<()> {
        self.sessions
            .get_mut(session)?
            .run(OperationKind::Digest, |op| op.update(data))
    }

    pub fn digest_len(&mut self, session: CK_SESSION_HANDLE) -> Result<usize> {
        self.sessions
            .get_mut(session)?
            .run(OperationKind::Digest, |op| Ok(op.output_len()))
    }

    pub fn digest_final(
        &mut self,
        session: CK_SESSION_HANDLE,
        out: &mut [u8],
    ) -> Result<usize> {
        self.sessions
            .get_mut(session)?
            .run(OperationKind::Digest, |op| op.digest_final(out))
    }

    pub fn digest(
        &mut self,
        session: CK_SESSION_HANDLE,
        data: &[u8],
        out: &mut [u8],
    ) -> Result<usize> {
        self.sessions
            .get_mut(session)?
            .run(OperationKind::Digest, |op| {
                if out.len() < op.output_len() {
                    return Err(Error::buf_too_small(op.output_len()));
                }
                op.update(data)?;
                op.digest_final(out)
            })
    }

    /* Decrypt */

    pub fn decrypt_init(
        &mut self,
        session: CK_SESSION_HANDLE,
        mech: &CkMechanism,
        key: Option<&Key>,
    ) -> Result<()> {
        let sess = self.sessions.get_mut(session)?;
        if sess.has_operation() {
            return Err(CKR_OPERATION_ACTIVE)?;
        }
        debug!("decrypt init: {}", mech_name(mech.mechanism));
        let op = self
            .mechanisms
            .get(mech.mechanism)?
            .decryption_new(mech, key)?;
        sess.set_operation(op)
    }

    pub fn decrypt_update(
        &mut self,
        session: CK_SESSION_HANDLE,
        ciphertext: &[u8],
    ) -> Result<()> {
        self.sessions
            .get_mut(session)?
            .run(OperationKind::Decrypt, |op| op.update(ciphertext))
    }

    /// Upper bound of the plaintext the active decryption can return
    pub fn decrypt_len(&mut self, session: CK_SESSION_HANDLE) -> Result<usize> {
        self.sessions
            .get_mut(session)?
            .run(OperationKind::Decrypt, |op| Ok(op.output_len()))
    }

    pub fn decrypt_final(
        &mut self,
        session: CK_SESSION_HANDLE,
        out: &mut [u8],
    ) -> Result<usize> {
        let token = &self.token;
        self.sessions
            .get_mut(session)?
            .run(OperationKind::Decrypt, |op| op.decrypt_final(token, out))
    }

    pub fn decrypt(
        &mut self,
        session: CK_SESSION_HANDLE,
        ciphertext: &[u8],
        out: &mut [u8],
    ) -> Result<usize> {
        let token = &self.token;
        self.sessions
            .get_mut(session)?
            .run(OperationKind::Decrypt, |op| {
                if out.len() < op.output_len() {
                    return Err(Error::buf_too_small(op.output_len()));
                }
                op.update(ciphertext)?;
                op.decrypt_final(token, out)
            })
    }
}

#[cfg(test)]
mod tests;
