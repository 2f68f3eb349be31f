// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

use crate::tests::*;

use serial_test::parallel;

#[test]
#[parallel]
fn test_accumulator_hash() {
    let mut acc = ret_or_panic!(Accumulator::hash(sha256()));
    assert_eq!(acc.hash_spec().map(|hs| hs.mech), Some(CKM_SHA256));
    ret_or_panic!(acc.update(b"a"));
    ret_or_panic!(acc.update(b""));
    ret_or_panic!(acc.update(b"bc"));
    assert_eq!(acc.raw_len(), 0);
    let digest = ret_or_panic!(acc.finish());
    assert_eq!(
        hex::encode(digest),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
#[parallel]
fn test_accumulator_raw() {
    let mut acc = Accumulator::raw(8);
    assert!(acc.hash_spec().is_none());
    ret_or_panic!(acc.update(&[1, 2, 3]));
    ret_or_panic!(acc.update(&[4, 5, 6, 7]));
    assert_eq!(acc.raw_len(), 7);

    /* an update that does not fit is refused whole */
    let ret = acc.update(&[8, 9]);
    assert_eq!(ret_rv(ret), CKR_DATA_LEN_RANGE);
    assert_eq!(acc.raw_len(), 7);

    ret_or_panic!(acc.update(&[8]));
    assert_eq!(ret_or_panic!(acc.finish()), vec![1, 2, 3, 4, 5, 6, 7, 8]);
}
