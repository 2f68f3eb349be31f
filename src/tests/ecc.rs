// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

use crate::tests::*;

use openssl::bn::BigNum;
use openssl::ecdsa::EcdsaSig;

use serial_test::parallel;

fn ossl_verify_raw(curve: EcCurve, digest: &[u8], raw: &[u8]) -> bool {
    let pkey = match curve {
        EcCurve::P256 => &test_keys().p256,
        EcCurve::P384 => &test_keys().p384,
    };
    let ec = ret_or_panic!(pkey.ec_key());
    let (r, s) = raw.split_at(raw.len() / 2);
    let sig = ret_or_panic!(EcdsaSig::from_private_components(
        ret_or_panic!(BigNum::from_slice(r)),
        ret_or_panic!(BigNum::from_slice(s)),
    ));
    ret_or_panic!(sig.verify(digest, &ec))
}

#[test]
#[parallel]
fn test_ecdsa_sha256_p256() {
    let mut prov = provider();
    let session = prov.open_session();
    let key = ec_key(EcCurve::P256);
    let mech = CkMechanism::new(CKM_ECDSA_SHA256);
    let data = b"ecdsa test message";

    ret_or_panic!(prov.sign_init(session, &mech, Some(&key)));
    assert_eq!(ret_or_panic!(prov.sign_len(session)), 64);
    let mut sig = vec![0u8; 64];
    let len = ret_or_panic!(prov.sign(session, data, &mut sig));
    assert_eq!(len, 64);

    let digest = ret_or_panic!(sha256().digest(data));
    assert!(ossl_verify_raw(EcCurve::P256, &digest, &sig));

    ret_or_panic!(prov.verify_init(session, &mech, Some(&key)));
    ret_or_panic!(prov.verify(session, data, &sig));

    let mut bad = sig.clone();
    bad[10] ^= 0x80;
    ret_or_panic!(prov.verify_init(session, &mech, Some(&key)));
    let ret = prov.verify(session, data, &bad);
    assert_eq!(ret_rv(ret), CKR_SIGNATURE_INVALID);

    ret_or_panic!(prov.verify_init(session, &mech, Some(&key)));
    let ret = prov.verify(session, data, &sig[..63]);
    assert_eq!(ret_rv(ret), CKR_SIGNATURE_LEN_RANGE);
}

#[test]
#[parallel]
fn test_ecdsa_p384_lengths() {
    let mut prov = provider();
    let session = prov.open_session();
    let key = ec_key(EcCurve::P384);

    /* every signature is exactly twice the field length, whatever the
     * DER encoding of r and s looked like */
    for _ in 0..16 {
        ret_or_panic!(prov.sign_init(
            session,
            &CkMechanism::new(CKM_ECDSA_SHA384),
            Some(&key)
        ));
        let mut sig = vec![0u8; 96];
        let len = ret_or_panic!(prov.sign(session, b"p384", &mut sig));
        assert_eq!(len, 96);
        let hs = ret_or_panic!(hash::resolve(CKM_SHA384).ok_or("no sha384"));
        let digest = ret_or_panic!(hs.digest(b"p384"));
        assert!(ossl_verify_raw(EcCurve::P384, &digest, &sig));
    }
}

#[test]
#[parallel]
fn test_ecdsa_raw() {
    let mut prov = provider();
    let session = prov.open_session();
    let key = ec_key(EcCurve::P256);
    let mech = CkMechanism::new(CKM_ECDSA);

    /* CKM_ECDSA signs whatever it is given, usually a digest */
    let digest = ret_or_panic!(sha256().digest(b"prehashed"));
    ret_or_panic!(prov.sign_init(session, &mech, Some(&key)));
    ret_or_panic!(prov.sign_update(session, &digest[..16]));
    ret_or_panic!(prov.sign_update(session, &digest[16..]));
    let mut sig = vec![0u8; 64];
    ret_or_panic!(prov.sign_final(session, &mut sig));
    assert!(ossl_verify_raw(EcCurve::P256, &digest, &sig));

    ret_or_panic!(prov.verify_init(session, &mech, Some(&key)));
    ret_or_panic!(prov.verify(session, &digest, &sig));
}

#[test]
#[parallel]
fn test_ecdsa_raw_buffer_limit() {
    let conf = ret_or_panic!(Config::from_str("raw_buffer_size = 64\n"));
    let mut prov = provider_with(&conf);
    let session = prov.open_session();
    let key = ec_key(EcCurve::P256);
    let mech = CkMechanism::new(CKM_ECDSA);

    ret_or_panic!(prov.sign_init(session, &mech, Some(&key)));
    ret_or_panic!(prov.sign_update(session, &[1u8; 60]));
    let ret = prov.sign_update(session, &[1u8; 5]);
    assert_eq!(ret_rv(ret), CKR_DATA_LEN_RANGE);

    /* the error terminated the operation */
    let mut sig = vec![0u8; 64];
    let ret = prov.sign_final(session, &mut sig);
    assert_eq!(ret_rv(ret), CKR_OPERATION_NOT_INITIALIZED);
    assert_eq!(prov.token().calls(), 0);

    /* filling the buffer exactly is fine */
    ret_or_panic!(prov.sign_init(session, &mech, Some(&key)));
    ret_or_panic!(prov.sign_update(session, &[1u8; 64]));
    ret_or_panic!(prov.sign_final(session, &mut sig));
}

#[test]
#[parallel]
fn test_ecdsa_arg_checks() {
    let mut prov = provider();
    let session = prov.open_session();

    let mech = CkMechanism::new(CKM_ECDSA_SHA256);
    let ret = prov.sign_init(session, &mech, Some(&rsa_key()));
    assert_eq!(ret_rv(ret), CKR_KEY_TYPE_INCONSISTENT);
    let ret = prov.verify_init(session, &mech, Some(&ed25519_key()));
    assert_eq!(ret_rv(ret), CKR_KEY_TYPE_INCONSISTENT);

    let param = [0u8; 1];
    let mech = CkMechanism::with_param(CKM_ECDSA_SHA256, &param);
    let ret = prov.sign_init(session, &mech, Some(&ec_key(EcCurve::P256)));
    assert_eq!(ret_rv(ret), CKR_MECHANISM_PARAM_INVALID);

    /* EC keys cannot decrypt */
    let ret = prov.decrypt_init(
        session,
        &CkMechanism::new(CKM_ECDSA),
        Some(&ec_key(EcCurve::P256)),
    );
    assert_eq!(ret_rv(ret), CKR_MECHANISM_INVALID);

    /* malformed points are refused */
    let ret = Key::new(
        9,
        PublicKey::Ec {
            curve: EcCurve::P256,
            point: vec![0x04; 64],
        },
    );
    assert_eq!(ret_rv(ret), CKR_ARGUMENTS_BAD);
    let ret = Key::new(
        9,
        PublicKey::Ec {
            curve: EcCurve::P384,
            point: vec![0x02; 97],
        },
    );
    assert_eq!(ret_rv(ret), CKR_ARGUMENTS_BAD);
}

#[test]
#[parallel]
fn test_ecdsa_bad_token_signature() {
    let mut prov = provider();
    let session = prov.open_session();
    let key = ec_key(EcCurve::P256);

    /* the token holds a P-384 key behind a handle described as P-256,
     * its r and s do not fit the 32 byte field */
    let mismatched = ret_or_panic!(Key::new(P384_HANDLE, key.public().clone()));
    let mut failures = 0;
    for _ in 0..8 {
        ret_or_panic!(prov.sign_init(
            session,
            &CkMechanism::new(CKM_ECDSA_SHA256),
            Some(&mismatched)
        ));
        let mut sig = vec![0u8; 64];
        if let Err(e) = prov.sign(session, b"data", &mut sig) {
            assert_eq!(e.rv(), CKR_FUNCTION_FAILED);
            failures += 1;
        }
    }
    /* a P-384 value fits 32 bytes only with negligible probability */
    assert_eq!(failures, 8);
}
