// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::tests::*;

use openssl::bn::BigNumContext;
use openssl::ec::{EcGroup, EcKey, PointConversionForm};
use openssl::ecdsa::EcdsaSig;
use openssl::error::ErrorStack;
use openssl::pkey::{PKey, Private};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::Signer;

pub const RSA_HANDLE: KeyHandle = 1;
pub const P256_HANDLE: KeyHandle = 2;
pub const P384_HANDLE: KeyHandle = 3;
pub const ED25519_HANDLE: KeyHandle = 4;

pub struct TestKeys {
    pub rsa: PKey<Private>,
    pub p256: PKey<Private>,
    pub p384: PKey<Private>,
    pub ed25519: PKey<Private>,
}

fn ec_generate(curve: EcCurve) -> PKey<Private> {
    let group = ret_or_panic!(EcGroup::from_curve_name(curve.nid()));
    let ec = ret_or_panic!(EcKey::generate(&group));
    ret_or_panic!(PKey::from_ec_key(ec))
}

/* Key generation is slow, all tests share one set */
pub fn test_keys() -> &'static TestKeys {
    static KEYS: OnceLock<TestKeys> = OnceLock::new();
    KEYS.get_or_init(|| TestKeys {
        rsa: ret_or_panic!(PKey::from_rsa(ret_or_panic!(Rsa::generate(2048)))),
        p256: ec_generate(EcCurve::P256),
        p384: ec_generate(EcCurve::P384),
        ed25519: ret_or_panic!(PKey::generate_ed25519()),
    })
}

pub fn rsa_key() -> Key {
    let rsa = ret_or_panic!(test_keys().rsa.rsa());
    ret_or_panic!(Key::new(
        RSA_HANDLE,
        PublicKey::Rsa {
            modulus: rsa.n().to_vec(),
            exponent: rsa.e().to_vec(),
        },
    ))
}

pub fn ec_key(curve: EcCurve) -> Key {
    let (handle, pkey) = match curve {
        EcCurve::P256 => (P256_HANDLE, &test_keys().p256),
        EcCurve::P384 => (P384_HANDLE, &test_keys().p384),
    };
    let ec = ret_or_panic!(pkey.ec_key());
    let mut ctx = ret_or_panic!(BigNumContext::new());
    let point = ret_or_panic!(ec.public_key().to_bytes(
        ec.group(),
        PointConversionForm::UNCOMPRESSED,
        &mut ctx
    ));
    ret_or_panic!(Key::new(handle, PublicKey::Ec { curve, point }))
}

pub fn ed25519_key() -> Key {
    let point = ret_or_panic!(test_keys().ed25519.raw_public_key());
    ret_or_panic!(Key::new(ED25519_HANDLE, PublicKey::Ed25519 { point }))
}

fn device_error(e: ErrorStack) -> TokenError {
    TokenError::Device(e.to_string())
}

/// Software stand in for a PIV device. It runs the raw private key
/// primitives with openssl and can be told to fail or to drop leading
/// zero bytes from its output.
pub struct FakeToken {
    keys: HashMap<KeyHandle, PKey<Private>>,
    failure: RefCell<Option<TokenError>>,
    calls: Cell<usize>,
    trim_output: Cell<bool>,
}

impl FakeToken {
    pub fn new() -> FakeToken {
        let tk = test_keys();
        let mut keys = HashMap::new();
        keys.insert(RSA_HANDLE, tk.rsa.clone());
        keys.insert(P256_HANDLE, tk.p256.clone());
        keys.insert(P384_HANDLE, tk.p384.clone());
        keys.insert(ED25519_HANDLE, tk.ed25519.clone());
        FakeToken {
            keys,
            failure: RefCell::new(None),
            calls: Cell::new(0),
            trim_output: Cell::new(false),
        }
    }

    pub fn fail_with(&self, error: Option<TokenError>) {
        *self.failure.borrow_mut() = error;
    }

    pub fn trim_output(&self, trim: bool) {
        self.trim_output.set(trim);
    }

    /// Number of sign and decrypt calls that reached the device
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    fn enter(&self, key: KeyHandle) -> TokenResult<&PKey<Private>> {
        self.calls.set(self.calls.get() + 1);
        if let Some(e) = self.failure.borrow().clone() {
            return Err(e);
        }
        match self.keys.get(&key) {
            Some(k) => Ok(k),
            None => Err(TokenError::Device(format!("no key in slot {}", key))),
        }
    }

    fn finish(&self, mut out: Vec<u8>) -> Vec<u8> {
        if self.trim_output.get() {
            let skip = out.iter().take_while(|b| **b == 0).count();
            out.drain(..skip);
        }
        out
    }

    fn rsa_raw(
        &self,
        pkey: &PKey<Private>,
        input: &[u8],
        decrypt: bool,
    ) -> TokenResult<Vec<u8>> {
        let rsa = pkey.rsa().map_err(device_error)?;
        let mut out = vec![0u8; rsa.size() as usize];
        let len = if decrypt {
            rsa.private_decrypt(input, &mut out, Padding::NONE)
        } else {
            rsa.private_encrypt(input, &mut out, Padding::NONE)
        }
        .map_err(device_error)?;
        out.truncate(len);
        Ok(self.finish(out))
    }
}

impl Token for FakeToken {
    fn sign(
        &self,
        data: &[u8],
        algorithm: KeyAlgorithm,
        key: KeyHandle,
    ) -> TokenResult<Vec<u8>> {
        let pkey = self.enter(key)?;
        match algorithm {
            KeyAlgorithm::EccP256 | KeyAlgorithm::EccP384 => {
                let ec = pkey.ec_key().map_err(device_error)?;
                let sig = EcdsaSig::sign(data, &ec).map_err(device_error)?;
                sig.to_der().map_err(device_error)
            }
            KeyAlgorithm::Ed25519 => {
                let mut signer =
                    Signer::new_without_digest(pkey).map_err(device_error)?;
                signer.sign_oneshot_to_vec(data).map_err(device_error)
            }
            _ => {
                if data.len() != algorithm.signature_size() {
                    return Err(TokenError::Device(format!(
                        "bad input length {}",
                        data.len()
                    )));
                }
                self.rsa_raw(pkey, data, false)
            }
        }
    }

    fn decrypt(
        &self,
        ciphertext: &[u8],
        algorithm: KeyAlgorithm,
        key: KeyHandle,
    ) -> TokenResult<Vec<u8>> {
        let pkey = self.enter(key)?;
        if algorithm.key_type() != CKK_RSA {
            return Err(TokenError::Device("not an RSA slot".to_string()));
        }
        self.rsa_raw(pkey, ciphertext, true)
    }

    fn mechanism_info(
        &self,
        mech: CK_MECHANISM_TYPE,
    ) -> Option<CK_MECHANISM_INFO> {
        let (min, max) = match mech {
            CKM_RSA_PKCS_KEY_PAIR_GEN => (1024, 4096),
            CKM_EC_KEY_PAIR_GEN => (256, 384),
            CKM_EC_EDWARDS_KEY_PAIR_GEN => (255, 255),
            _ => return None,
        };
        Some(CK_MECHANISM_INFO {
            ulMinKeySize: min,
            ulMaxKeySize: max,
            flags: CKF_HW,
        })
    }
}

pub fn provider() -> Provider<FakeToken> {
    ret_or_panic!(Provider::new(FakeToken::new(), &Config::default()))
}

pub fn provider_with(conf: &Config) -> Provider<FakeToken> {
    ret_or_panic!(Provider::new(FakeToken::new(), conf))
}
