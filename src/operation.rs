// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

//! Per operation state machines.
//!
//! An [OperationContext] is created by a mechanism's `*_new` method,
//! fed by `update` and consumed by the matching `*_final`. Once final
//! has run (successfully or not) the context only accepts being
//! dropped. The only exception is a buffer too small error, which is
//! detected before anything destructive happens so the caller can
//! retry with a larger buffer.

use crate::accumulator::Accumulator;
use crate::error::{Error, Result};
use crate::hash::HashSpec;
use crate::key::{Key, KeyAlgorithm, KeyHandle, PublicKey};
use crate::ossl;
use crate::padding::*;
use crate::pkcs11::*;
use crate::token::Token;

use log::{debug, error, warn};
use zeroize::Zeroize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Sign,
    Verify,
    Digest,
    Decrypt,
}

#[derive(Debug)]
pub struct SignState {
    algorithm: KeyAlgorithm,
    handle: KeyHandle,
    padding: PaddingScheme,
    mod_bits: usize,
}

#[derive(Debug)]
pub struct VerifyState {
    public: PublicKey,
    padding: PaddingScheme,
    mod_bits: usize,
}

#[derive(Debug)]
pub struct DecryptState {
    algorithm: KeyAlgorithm,
    handle: KeyHandle,
    padding: PaddingScheme,
    key_len: usize,
}

#[derive(Debug)]
pub struct DigestState {
    hash: &'static HashSpec,
}

#[derive(Debug)]
pub enum OperationState {
    Sign(SignState),
    Verify(VerifyState),
    Decrypt(DecryptState),
    Digest(DigestState),
}

#[derive(Debug)]
pub struct OperationContext {
    mechanism: CK_MECHANISM_TYPE,
    accumulator: Accumulator,
    output_len: usize,
    state: OperationState,
    finalized: bool,
}

fn new_accumulator(
    hash: Option<&'static HashSpec>,
    raw_capacity: usize,
) -> Result<Accumulator> {
    match hash {
        Some(hs) => Accumulator::hash(hs),
        None => Ok(Accumulator::raw(raw_capacity)),
    }
}

impl OperationContext {
    /// Sets up a signature. With `hash` the input is digested in
    /// software, otherwise up to `raw_capacity` bytes are buffered.
    pub fn sign(
        mechanism: CK_MECHANISM_TYPE,
        key: &Key,
        hash: Option<&'static HashSpec>,
        padding: PaddingScheme,
        raw_capacity: usize,
    ) -> Result<OperationContext> {
        Ok(OperationContext {
            mechanism,
            accumulator: new_accumulator(hash, raw_capacity)?,
            output_len: key.signature_size(),
            state: OperationState::Sign(SignState {
                algorithm: key.algorithm(),
                handle: key.handle(),
                padding,
                mod_bits: key.modulus_bits(),
            }),
            finalized: false,
        })
    }

    pub fn verify(
        mechanism: CK_MECHANISM_TYPE,
        key: &Key,
        hash: Option<&'static HashSpec>,
        padding: PaddingScheme,
        raw_capacity: usize,
    ) -> Result<OperationContext> {
        Ok(OperationContext {
            mechanism,
            accumulator: new_accumulator(hash, raw_capacity)?,
            output_len: key.signature_size(),
            state: OperationState::Verify(VerifyState {
                public: key.public().clone(),
                padding,
                mod_bits: key.modulus_bits(),
            }),
            finalized: false,
        })
    }

    pub fn digest(hash: &'static HashSpec) -> Result<OperationContext> {
        Ok(OperationContext {
            mechanism: hash.mech,
            accumulator: Accumulator::hash(hash)?,
            output_len: hash.size,
            state: OperationState::Digest(DigestState { hash }),
            finalized: false,
        })
    }

    /// Sets up an RSA decryption; the ciphertext is buffered whole
    pub fn decrypt(
        mechanism: CK_MECHANISM_TYPE,
        key: &Key,
        padding: PaddingScheme,
    ) -> Result<OperationContext> {
        let key_len = key.signature_size();
        Ok(OperationContext {
            mechanism,
            accumulator: Accumulator::raw(key_len),
            output_len: padding.max_message_len(key_len),
            state: OperationState::Decrypt(DecryptState {
                algorithm: key.algorithm(),
                handle: key.handle(),
                padding,
                key_len,
            }),
            finalized: false,
        })
    }

    pub fn mechanism(&self) -> CK_MECHANISM_TYPE {
        self.mechanism
    }

    pub fn kind(&self) -> OperationKind {
        match self.state {
            OperationState::Sign(_) => OperationKind::Sign,
            OperationState::Verify(_) => OperationKind::Verify,
            OperationState::Decrypt(_) => OperationKind::Decrypt,
            OperationState::Digest(_) => OperationKind::Digest,
        }
    }

    pub fn finalized(&self) -> bool {
        self.finalized
    }

    /// Bytes `final` produces: the signature or digest length, or the
    /// largest plaintext a decryption can return
    pub fn output_len(&self) -> usize {
        self.output_len
    }

    pub fn update(&mut self, data: &[u8]) -> Result<()> {
        if self.finalized {
            return Err(CKR_OPERATION_NOT_INITIALIZED)?;
        }
        match self.accumulator.update(data) {
            Err(e) if e.rv() == CKR_DATA_LEN_RANGE => {
                self.finalized = true;
                match self.state {
                    OperationState::Decrypt(_) => {
                        Err(CKR_ENCRYPTED_DATA_LEN_RANGE)?
                    }
                    _ => Err(e),
                }
            }
            Err(e) => {
                self.finalized = true;
                Err(e)
            }
            Ok(()) => Ok(()),
        }
    }

    fn check_final(&self, out_len: usize) -> Result<()> {
        if self.finalized {
            return Err(CKR_OPERATION_NOT_INITIALIZED)?;
        }
        if out_len < self.output_len {
            return Err(Error::buf_too_small(self.output_len));
        }
        Ok(())
    }

    pub fn sign_final(
        &mut self,
        token: &dyn Token,
        out: &mut [u8],
    ) -> Result<usize> {
        let OperationState::Sign(st) = &self.state else {
            return Err(CKR_OPERATION_NOT_INITIALIZED)?;
        };
        self.check_final(out.len())?;
        self.finalized = true;

        let k = self.output_len;
        let hash = self.accumulator.hash_spec();
        let data = self.accumulator.finish()?;
        let tbs = if st.algorithm.key_type() == CKK_RSA {
            match &st.padding {
                PaddingScheme::None => raw_pad(&data, k)?,
                PaddingScheme::Pkcs1v15 => {
                    pkcs1v15_sign_encode(&data, hash, k)?
                }
                PaddingScheme::Pss {
                    hash: pss_hash,
                    mgf,
                    salt_len,
                } => pss_encode(&data, pss_hash, mgf, *salt_len, st.mod_bits)?,
                PaddingScheme::Oaep { .. } => {
                    return Err(CKR_MECHANISM_INVALID)?;
                }
            }
        } else {
            data
        };

        debug!(
            "token sign: mechanism {:#x}, {} bytes, key {}",
            self.mechanism,
            tbs.len(),
            st.handle
        );
        let sig = match token.sign(&tbs, st.algorithm, st.handle) {
            Ok(s) => s,
            Err(e) => {
                error!("token sign failed: {}", e);
                return Err(e.into());
            }
        };

        let sig = match st.algorithm {
            KeyAlgorithm::EccP256 | KeyAlgorithm::EccP384 => {
                ecdsa_der_decode(&sig, k / 2)?
            }
            KeyAlgorithm::Ed25519 => {
                if sig.len() != k {
                    return Err(Error::ck_rv_with_errmsg(
                        CKR_DEVICE_ERROR,
                        format!("token returned {} byte signature", sig.len()),
                    ));
                }
                sig
            }
            _ => {
                if sig.len() > k {
                    return Err(Error::ck_rv_with_errmsg(
                        CKR_DEVICE_ERROR,
                        format!("token returned {} byte signature", sig.len()),
                    ));
                }
                raw_pad(&sig, k)?
            }
        };
        out[..sig.len()].copy_from_slice(&sig);
        Ok(sig.len())
    }

    pub fn verify_final(&mut self, signature: &[u8]) -> Result<()> {
        let OperationState::Verify(st) = &self.state else {
            return Err(CKR_OPERATION_NOT_INITIALIZED)?;
        };
        if self.finalized {
            return Err(CKR_OPERATION_NOT_INITIALIZED)?;
        }
        self.finalized = true;
        if signature.len() != self.output_len {
            return Err(CKR_SIGNATURE_LEN_RANGE)?;
        }

        let k = self.output_len;
        let hash = self.accumulator.hash_spec();
        let data = self.accumulator.finish()?;
        match &st.public {
            PublicKey::Ed25519 { point } => {
                ossl::eddsa_verify(point, &data, signature)
            }
            PublicKey::Ec { curve, point } => {
                let der = ecdsa_der_encode(signature)
                    .map_err(|_| Error::ck_rv(CKR_SIGNATURE_INVALID))?;
                ossl::ecdsa_verify(*curve, point, &data, &der)
            }
            PublicKey::Rsa { modulus, exponent } => {
                let em = ossl::rsa_public_raw(modulus, exponent, signature)?;
                let em = raw_pad(&em, k)?;
                let ok = match &st.padding {
                    PaddingScheme::None => {
                        let expected = raw_pad(&data, k)?;
                        constant_time_eq::constant_time_eq(&em, &expected)
                    }
                    PaddingScheme::Pkcs1v15 => {
                        /* only the single canonical encoding verifies */
                        let expected = pkcs1v15_sign_encode(&data, hash, k)?;
                        constant_time_eq::constant_time_eq(&em, &expected)
                    }
                    PaddingScheme::Pss {
                        hash: pss_hash,
                        mgf,
                        salt_len,
                    } => {
                        if data.len() != pss_hash.size {
                            return Err(CKR_DATA_LEN_RANGE)?;
                        }
                        pss_verify(
                            &data,
                            &em,
                            pss_hash,
                            mgf,
                            *salt_len,
                            st.mod_bits,
                        )?;
                        true
                    }
                    PaddingScheme::Oaep { .. } => {
                        return Err(CKR_MECHANISM_INVALID)?;
                    }
                };
                if ok {
                    Ok(())
                } else {
                    Err(CKR_SIGNATURE_INVALID)?
                }
            }
        }
    }

    pub fn digest_final(&mut self, out: &mut [u8]) -> Result<usize> {
        let OperationState::Digest(st) = &self.state else {
            return Err(CKR_OPERATION_NOT_INITIALIZED)?;
        };
        self.check_final(out.len())?;
        self.finalized = true;
        let digest = self.accumulator.finish()?;
        if digest.len() != st.hash.size {
            return Err(CKR_GENERAL_ERROR)?;
        }
        out[..digest.len()].copy_from_slice(&digest);
        Ok(digest.len())
    }

    pub fn decrypt_final(
        &mut self,
        token: &dyn Token,
        out: &mut [u8],
    ) -> Result<usize> {
        let OperationState::Decrypt(st) = &self.state else {
            return Err(CKR_OPERATION_NOT_INITIALIZED)?;
        };
        self.check_final(out.len())?;
        self.finalized = true;

        let k = st.key_len;
        let ciphertext = self.accumulator.finish()?;
        if ciphertext.len() != k {
            return Err(CKR_ENCRYPTED_DATA_LEN_RANGE)?;
        }

        debug!(
            "token decrypt: mechanism {:#x}, key {}",
            self.mechanism, st.handle
        );
        let res = token.decrypt(&ciphertext, st.algorithm, st.handle);
        let mut block = match res {
            Ok(b) => b,
            Err(e) => {
                error!("token decrypt failed: {}", e);
                return Err(e.into());
            }
        };
        if block.len() > k {
            block.zeroize();
            return Err(Error::ck_rv_with_errmsg(
                CKR_DEVICE_ERROR,
                format!("token returned {} byte block", block.len()),
            ));
        }
        let mut em = raw_pad(&block, k)?;
        block.zeroize();

        let res = match &st.padding {
            PaddingScheme::None => raw_strip(&em, k),
            PaddingScheme::Pkcs1v15 => pkcs1v15_decrypt_unpad(&em),
            PaddingScheme::Oaep { hash, mgf, label } => {
                oaep_decode(&em, hash, mgf, label)
            }
            PaddingScheme::Pss { .. } => Err(CKR_MECHANISM_INVALID.into()),
        };
        em.zeroize();
        let mut msg = match res {
            Ok(m) => m,
            Err(e) => {
                warn!("decrypt: padding check failed");
                return Err(e);
            }
        };
        if msg.len() > out.len() {
            let len = msg.len();
            msg.zeroize();
            return Err(Error::buf_too_small(len));
        }
        out[..msg.len()].copy_from_slice(&msg);
        let len = msg.len();
        msg.zeroize();
        Ok(len)
    }
}
