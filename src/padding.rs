// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

//! Stateless padding and encoding transforms.
//!
//! Everything here works on plain byte buffers and a key size. RSA
//! encodings follow [RFC 8017](https://www.rfc-editor.org/rfc/rfc8017),
//! the EC signature conversion follows
//! [RFC 3279](https://www.rfc-editor.org/rfc/rfc3279#section-2.2.3).

use crate::error::{Error, Result};
use crate::hash::HashSpec;
use crate::kasn1::{der_uint_bytes, DigestInfo, EcdsaSignature};
use crate::pkcs11::*;

use subtle::{
    Choice, ConditionallySelectable, ConstantTimeEq, ConstantTimeGreater,
};
use zeroize::Zeroize;

/// Minimum PKCS#1 v1.5 overhead: `00 || BT || PS(8) || 00`
pub const PKCS1_OVERHEAD: usize = 11;

/// Padding selected for an RSA operation
#[derive(Debug)]
pub enum PaddingScheme {
    None,
    Pkcs1v15,
    Pss {
        hash: &'static HashSpec,
        mgf: &'static HashSpec,
        salt_len: usize,
    },
    Oaep {
        hash: &'static HashSpec,
        mgf: &'static HashSpec,
        label: Vec<u8>,
    },
}

impl PaddingScheme {
    /// Largest message the scheme can carry in a `k` byte block
    pub fn max_message_len(&self, k: usize) -> usize {
        match self {
            PaddingScheme::None => k,
            PaddingScheme::Pkcs1v15 => k.saturating_sub(PKCS1_OVERHEAD),
            PaddingScheme::Pss { hash, .. } => hash.size,
            PaddingScheme::Oaep { hash, .. } => {
                k.saturating_sub(2 * hash.size + 2)
            }
        }
    }
}

impl Drop for PaddingScheme {
    fn drop(&mut self) {
        if let PaddingScheme::Oaep { label, .. } = self {
            label.zeroize();
        }
    }
}

fn xor_in_place(dst: &mut [u8], mask: &[u8]) {
    for (d, m) in dst.iter_mut().zip(mask.iter()) {
        *d ^= *m;
    }
}

/// MGF1 mask generation
/// ([RFC 8017 B.2.1](https://www.rfc-editor.org/rfc/rfc8017#appendix-B.2.1))
pub fn mgf1(mgf: &HashSpec, seed: &[u8], len: usize) -> Result<Vec<u8>> {
    let mut mask = Vec::with_capacity(len + mgf.size);
    let mut counter: u32 = 0;
    while mask.len() < len {
        mask.extend_from_slice(
            &mgf.digest_parts(&[seed, &counter.to_be_bytes()[..]])?,
        );
        counter = match counter.checked_add(1) {
            Some(c) => c,
            None => return Err(CKR_DATA_LEN_RANGE)?,
        };
    }
    mask.truncate(len);
    Ok(mask)
}

/* PKCS#1 v1.5 signatures */

/// Produces `00 01 FF..FF 00 T` of `k` bytes. `T` is the DigestInfo of
/// `digest` when `hash` is given, otherwise `digest` is taken as an
/// already formatted `T` (raw `CKM_RSA_PKCS`).
pub fn pkcs1v15_sign_encode(
    digest: &[u8],
    hash: Option<&HashSpec>,
    k: usize,
) -> Result<Vec<u8>> {
    let t = match hash {
        Some(hs) => DigestInfo::new(hs, digest)?.to_der()?,
        None => digest.to_vec(),
    };
    if t.len() + PKCS1_OVERHEAD > k {
        return Err(CKR_DATA_LEN_RANGE)?;
    }
    let mut em = vec![0xffu8; k];
    em[0] = 0x00;
    em[1] = 0x01;
    em[k - t.len() - 1] = 0x00;
    em[k - t.len()..].copy_from_slice(&t);
    Ok(em)
}

/// Reverses [pkcs1v15_sign_encode]. Any structural deviation, including
/// a DigestInfo naming a different hash or lacking the NULL parameters,
/// is a signature error.
pub fn pkcs1v15_sign_decode(
    em: &[u8],
    hash: Option<&HashSpec>,
) -> Result<Vec<u8>> {
    if em.len() < PKCS1_OVERHEAD || em[0] != 0x00 || em[1] != 0x01 {
        return Err(CKR_SIGNATURE_INVALID)?;
    }
    let ps_len = em[2..].iter().take_while(|b| **b == 0xff).count();
    let sep = 2 + ps_len;
    if ps_len < 8 || sep >= em.len() || em[sep] != 0x00 {
        return Err(CKR_SIGNATURE_INVALID)?;
    }
    let t = &em[sep + 1..];
    match hash {
        Some(hs) => {
            let di = match asn1::parse_single::<DigestInfo>(t) {
                Ok(di) => di,
                Err(_) => return Err(CKR_SIGNATURE_INVALID)?,
            };
            let expected = DigestInfo::new(hs, di.digest)
                .map_err(|_| Error::ck_rv(CKR_SIGNATURE_INVALID))?;
            if di.algorithm.oid != expected.algorithm.oid
                || di.algorithm.params.is_none()
            {
                return Err(CKR_SIGNATURE_INVALID)?;
            }
            Ok(di.digest.to_vec())
        }
        None => Ok(t.to_vec()),
    }
}

/* PKCS#1 v1.5 encryption */

/// Type 2 encryption block `00 02 PS 00 M` with a random non zero PS
pub fn pkcs1v15_encrypt_pad(msg: &[u8], k: usize) -> Result<Vec<u8>> {
    if msg.len() + PKCS1_OVERHEAD > k {
        return Err(CKR_DATA_LEN_RANGE)?;
    }
    let ps_len = k - msg.len() - 3;
    let mut em = vec![0u8; k];
    em[1] = 0x02;
    let ps = &mut em[2..2 + ps_len];
    openssl::rand::rand_bytes(ps)?;
    let mut b = [0u8; 1];
    for v in ps.iter_mut() {
        while *v == 0 {
            openssl::rand::rand_bytes(&mut b)?;
            *v = b[0];
        }
    }
    em[k - msg.len()..].copy_from_slice(msg);
    Ok(em)
}

/// Removes type 2 padding. The whole block is always scanned and every
/// malformation produces the same CKR_FUNCTION_FAILED.
pub fn pkcs1v15_decrypt_unpad(em: &[u8]) -> Result<Vec<u8>> {
    if em.len() < PKCS1_OVERHEAD {
        return Err(CKR_FUNCTION_FAILED)?;
    }
    let mut good = em[0].ct_eq(&0x00) & em[1].ct_eq(&0x02);
    let mut looking = Choice::from(1);
    let mut index: u32 = 0;
    for (i, b) in em.iter().enumerate().skip(2) {
        let is_zero = b.ct_eq(&0x00);
        index.conditional_assign(&(i as u32), looking & is_zero);
        looking &= !is_zero;
    }
    good &= !looking;
    /* PS must be at least 8 bytes, so the separator sits at 10 or later */
    good &= index.ct_gt(&9);
    if !bool::from(good) {
        return Err(CKR_FUNCTION_FAILED)?;
    }
    Ok(em[index as usize + 1..].to_vec())
}

/* PSS */

fn pss_lengths(
    hash: &HashSpec,
    salt_len: usize,
    mod_bits: usize,
) -> Result<(usize, usize)> {
    if mod_bits < 2 {
        return Err(CKR_KEY_SIZE_RANGE)?;
    }
    let em_bits = mod_bits - 1;
    let em_len = em_bits.div_ceil(8);
    if em_len < hash.size + salt_len + 2 {
        return Err(CKR_MECHANISM_PARAM_INVALID)?;
    }
    Ok((em_bits, em_len))
}

/// Largest salt a PSS encoding of `mod_bits` can carry with `hash`
pub fn pss_max_salt_len(hash: &HashSpec, mod_bits: usize) -> usize {
    let em_len = mod_bits.saturating_sub(1).div_ceil(8);
    em_len.saturating_sub(hash.size + 2)
}

/// EMSA-PSS encoding of `m_hash`, left padded to the modulus length
pub fn pss_encode(
    m_hash: &[u8],
    hash: &HashSpec,
    mgf: &HashSpec,
    salt_len: usize,
    mod_bits: usize,
) -> Result<Vec<u8>> {
    if m_hash.len() != hash.size {
        return Err(CKR_DATA_LEN_RANGE)?;
    }
    let (em_bits, em_len) = pss_lengths(hash, salt_len, mod_bits)?;
    let k = mod_bits.div_ceil(8);

    let mut salt = vec![0u8; salt_len];
    openssl::rand::rand_bytes(&mut salt)?;
    let h = hash.digest_parts(&[&[0u8; 8][..], m_hash, &salt[..]])?;

    let db_len = em_len - hash.size - 1;
    let mut em = vec![0u8; k];
    let off = k - em_len;
    {
        let db = &mut em[off..off + db_len];
        db[db_len - salt_len - 1] = 0x01;
        db[db_len - salt_len..].copy_from_slice(&salt);
        xor_in_place(db, &mgf1(mgf, &h, db_len)?);
        db[0] &= 0xffu8 >> (8 * em_len - em_bits);
    }
    em[off + db_len..k - 1].copy_from_slice(&h);
    em[k - 1] = 0xbc;
    Ok(em)
}

/// EMSA-PSS verification of a modulus sized block against `m_hash`
pub fn pss_verify(
    m_hash: &[u8],
    em: &[u8],
    hash: &HashSpec,
    mgf: &HashSpec,
    salt_len: usize,
    mod_bits: usize,
) -> Result<()> {
    let (em_bits, em_len) = pss_lengths(hash, salt_len, mod_bits)?;
    if m_hash.len() != hash.size || em.len() < em_len {
        return Err(CKR_SIGNATURE_INVALID)?;
    }
    let (lead, em) = em.split_at(em.len() - em_len);
    if lead.iter().any(|b| *b != 0) || em[em_len - 1] != 0xbc {
        return Err(CKR_SIGNATURE_INVALID)?;
    }
    let db_len = em_len - hash.size - 1;
    let top_mask = 0xffu8 >> (8 * em_len - em_bits);
    if em[0] & !top_mask != 0 {
        return Err(CKR_SIGNATURE_INVALID)?;
    }
    let h = &em[db_len..em_len - 1];
    let mut db = em[..db_len].to_vec();
    xor_in_place(&mut db, &mgf1(mgf, h, db_len)?);
    db[0] &= top_mask;

    let ps_len = db_len - salt_len - 1;
    if db[..ps_len].iter().any(|b| *b != 0) || db[ps_len] != 0x01 {
        return Err(CKR_SIGNATURE_INVALID)?;
    }
    let salt = &db[db_len - salt_len..];
    let h2 = hash.digest_parts(&[&[0u8; 8][..], m_hash, salt])?;
    if !constant_time_eq::constant_time_eq(h, &h2) {
        return Err(CKR_SIGNATURE_INVALID)?;
    }
    Ok(())
}

/* OAEP */

/// EME-OAEP encoding of `msg` into a `k` byte block
pub fn oaep_encode(
    msg: &[u8],
    hash: &HashSpec,
    mgf: &HashSpec,
    label: &[u8],
    k: usize,
) -> Result<Vec<u8>> {
    let h_len = hash.size;
    if k < 2 * h_len + 2 || msg.len() > k - 2 * h_len - 2 {
        return Err(CKR_DATA_LEN_RANGE)?;
    }
    let db_len = k - h_len - 1;
    let mut db = vec![0u8; db_len];
    db[..h_len].copy_from_slice(&hash.digest(label)?);
    db[db_len - msg.len() - 1] = 0x01;
    db[db_len - msg.len()..].copy_from_slice(msg);

    let mut seed = vec![0u8; h_len];
    openssl::rand::rand_bytes(&mut seed)?;
    xor_in_place(&mut db, &mgf1(mgf, &seed, db_len)?);
    xor_in_place(&mut seed, &mgf1(mgf, &db, h_len)?);

    let mut em = vec![0u8; k];
    em[1..=h_len].copy_from_slice(&seed);
    em[h_len + 1..].copy_from_slice(&db);
    seed.zeroize();
    db.zeroize();
    Ok(em)
}

/// EME-OAEP decoding. All checks run to completion and any failure is
/// reported as the same CKR_FUNCTION_FAILED.
pub fn oaep_decode(
    em: &[u8],
    hash: &HashSpec,
    mgf: &HashSpec,
    label: &[u8],
) -> Result<Vec<u8>> {
    let k = em.len();
    let h_len = hash.size;
    if k < 2 * h_len + 2 {
        return Err(CKR_FUNCTION_FAILED)?;
    }
    let l_hash = hash.digest(label)?;
    let masked_db = &em[h_len + 1..];
    let mut seed = em[1..=h_len].to_vec();
    xor_in_place(&mut seed, &mgf1(mgf, masked_db, h_len)?);
    let mut db = masked_db.to_vec();
    xor_in_place(&mut db, &mgf1(mgf, &seed, k - h_len - 1)?);

    let mut good = em[0].ct_eq(&0x00) & db[..h_len].ct_eq(&l_hash);
    let mut looking = Choice::from(1);
    let mut invalid = Choice::from(0);
    let mut index: u32 = 0;
    for (i, b) in db.iter().enumerate().skip(h_len) {
        let is_zero = b.ct_eq(&0x00);
        let is_one = b.ct_eq(&0x01);
        index.conditional_assign(&(i as u32), looking & is_one);
        invalid |= looking & !is_zero & !is_one;
        looking &= !is_one;
    }
    good &= !invalid & !looking;

    let result = if bool::from(good) {
        Ok(db[index as usize + 1..].to_vec())
    } else {
        Err(Error::ck_rv(CKR_FUNCTION_FAILED))
    };
    seed.zeroize();
    db.zeroize();
    result
}

/* Raw */

/// Left pads `data` with zeros to `k` bytes
pub fn raw_pad(data: &[u8], k: usize) -> Result<Vec<u8>> {
    if data.len() > k {
        return Err(CKR_DATA_LEN_RANGE)?;
    }
    let mut em = vec![0u8; k];
    em[k - data.len()..].copy_from_slice(data);
    Ok(em)
}

/// Passes a raw block through after checking it is exactly `k` bytes
pub fn raw_strip(em: &[u8], k: usize) -> Result<Vec<u8>> {
    if em.len() != k {
        return Err(CKR_FUNCTION_FAILED)?;
    }
    Ok(em.to_vec())
}

/* EC signatures */

/// Converts a raw `r || s` signature into a DER ECDSA-Sig-Value
pub fn ecdsa_der_encode(raw: &[u8]) -> Result<Vec<u8>> {
    if raw.is_empty() || raw.len() % 2 != 0 {
        return Err(CKR_SIGNATURE_LEN_RANGE)?;
    }
    let (r, s) = raw.split_at(raw.len() / 2);
    let r = der_uint_bytes(r);
    let s = der_uint_bytes(s);
    let sig = match (asn1::BigUint::new(&r), asn1::BigUint::new(&s)) {
        (Some(r), Some(s)) => EcdsaSignature { r, s },
        _ => return Err(CKR_GENERAL_ERROR)?,
    };
    match asn1::write_single(&sig) {
        Ok(der) => Ok(der),
        Err(_) => Err(CKR_GENERAL_ERROR)?,
    }
}

fn put_sig_half(out: &mut [u8], val: &[u8]) -> Result<()> {
    let skip = val.iter().take_while(|b| **b == 0).count();
    let val = &val[skip..];
    if val.len() > out.len() {
        return Err(Error::ck_rv_with_errmsg(
            CKR_FUNCTION_FAILED,
            format!(
                "signature integer of {} bytes exceeds field width {}",
                val.len(),
                out.len()
            ),
        ));
    }
    let off = out.len() - val.len();
    out[off..].copy_from_slice(val);
    Ok(())
}

/// Converts a DER ECDSA-Sig-Value into a raw `r || s` signature where
/// each half is `field_len` bytes
pub fn ecdsa_der_decode(der: &[u8], field_len: usize) -> Result<Vec<u8>> {
    let sig = match asn1::parse_single::<EcdsaSignature>(der) {
        Ok(s) => s,
        Err(e) => {
            return Err(Error::ck_rv_with_errmsg(
                CKR_FUNCTION_FAILED,
                format!("malformed ECDSA signature: {:?}", e),
            ))
        }
    };
    let mut raw = vec![0u8; 2 * field_len];
    let (r, s) = raw.split_at_mut(field_len);
    put_sig_half(r, sig.r.as_bytes())?;
    put_sig_half(s, sig.s.as_bytes())?;
    Ok(raw)
}
