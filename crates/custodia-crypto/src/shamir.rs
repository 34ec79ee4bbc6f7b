//! Secret sharing for data-encryption keys.
//!
//! Two constructions back the envelope formats:
//!   * [`xor_split`] / [`xor_combine`] — n-of-n XOR sharing, used per subset
//!     by envelope version 1.
//!   * [`split`] / [`combine`] — m-of-n Shamir sharing over GF(256)
//!     (AES field, reduction polynomial 0x11b), used by envelope version 2.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::CryptoError;

/// One Shamir share: the evaluation point and one byte of polynomial output
/// per byte of secret.
#[derive(Clone)]
pub struct Share {
    /// Evaluation point, never zero (x = 0 is the secret itself).
    pub x: u8,
    pub data: Zeroizing<Vec<u8>>,
}

// ── GF(256) arithmetic ───────────────────────────────────────────────────────

fn gf_mul(a: u8, b: u8) -> u8 {
    let mut a = a as u16;
    let mut b = b;
    let mut product = 0u16;
    for _ in 0..8 {
        if b & 1 != 0 {
            product ^= a;
        }
        b >>= 1;
        a <<= 1;
        if a & 0x100 != 0 {
            a ^= 0x11b;
        }
    }
    product as u8
}

fn gf_pow(mut base: u8, mut exp: u32) -> u8 {
    let mut result = 1u8;
    while exp > 0 {
        if exp & 1 == 1 {
            result = gf_mul(result, base);
        }
        base = gf_mul(base, base);
        exp >>= 1;
    }
    result
}

/// Multiplicative inverse; undefined for zero (callers exclude x = 0).
fn gf_inv(a: u8) -> u8 {
    debug_assert_ne!(a, 0);
    gf_pow(a, 254)
}

// ── Shamir split / combine ───────────────────────────────────────────────────

/// Split `secret` into `total` shares such that any `threshold` of them
/// reconstruct it.
pub fn split(secret: &[u8], total: u8, threshold: u8) -> Result<Vec<Share>, CryptoError> {
    if threshold == 0 || threshold > total {
        return Err(CryptoError::InvalidShares(format!(
            "threshold {threshold} out of range for {total} shares"
        )));
    }

    // One random polynomial per secret byte, degree threshold - 1, constant
    // term = the secret byte.
    let mut coeffs = Zeroizing::new(vec![0u8; (threshold as usize - 1) * secret.len()]);
    OsRng.fill_bytes(coeffs.as_mut_slice());

    let mut shares = Vec::with_capacity(total as usize);
    for x in 1..=total {
        let mut data = Zeroizing::new(vec![0u8; secret.len()]);
        for (i, &secret_byte) in secret.iter().enumerate() {
            // Horner evaluation, highest coefficient first.
            let mut y = 0u8;
            for c in (0..threshold as usize - 1).rev() {
                y = gf_mul(y, x) ^ coeffs[c * secret.len() + i];
            }
            data[i] = gf_mul(y, x) ^ secret_byte;
        }
        shares.push(Share {
            x,
            data,
        });
    }
    Ok(shares)
}

/// Reconstruct the secret from shares via Lagrange interpolation at zero.
///
/// All provided shares participate. Passing fewer shares than the split
/// threshold yields an unrelated value, not an error; callers gate the
/// count.
pub fn combine(shares: &[Share]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let Some(first) = shares.first() else {
        return Err(CryptoError::InvalidShares("no shares provided".into()));
    };
    let len = first.data.len();
    for share in shares {
        if share.x == 0 {
            return Err(CryptoError::InvalidShares("share with x = 0".into()));
        }
        if share.data.len() != len {
            return Err(CryptoError::InvalidShares("share length mismatch".into()));
        }
    }
    for (i, a) in shares.iter().enumerate() {
        for b in &shares[i + 1..] {
            if a.x == b.x {
                return Err(CryptoError::InvalidShares(format!(
                    "duplicate share index {}",
                    a.x
                )));
            }
        }
    }

    let mut secret = Zeroizing::new(vec![0u8; len]);
    for (j, share) in shares.iter().enumerate() {
        // Lagrange basis at zero: prod over m != j of x_m / (x_m - x_j).
        // Subtraction in GF(256) is XOR.
        let mut basis = 1u8;
        for (m, other) in shares.iter().enumerate() {
            if m == j {
                continue;
            }
            basis = gf_mul(basis, gf_mul(other.x, gf_inv(other.x ^ share.x)));
        }
        for i in 0..len {
            secret[i] ^= gf_mul(share.data[i], basis);
        }
    }
    Ok(secret)
}

// ── XOR n-of-n sharing ───────────────────────────────────────────────────────

/// Split `secret` into `n` shares that XOR back to it. All `n` are required.
pub fn xor_split(secret: &[u8], n: usize) -> Result<Vec<Zeroizing<Vec<u8>>>, CryptoError> {
    if n == 0 {
        return Err(CryptoError::InvalidShares("cannot split into 0 shares".into()));
    }
    let mut shares = Vec::with_capacity(n);
    let mut last = Zeroizing::new(secret.to_vec());
    for _ in 0..n - 1 {
        let mut pad = Zeroizing::new(vec![0u8; secret.len()]);
        OsRng.fill_bytes(pad.as_mut_slice());
        for (l, p) in last.iter_mut().zip(pad.iter()) {
            *l ^= p;
        }
        shares.push(pad);
    }
    shares.push(last);
    Ok(shares)
}

/// Recombine XOR shares. Share lengths must agree.
pub fn xor_combine(shares: &[impl AsRef<[u8]>]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let Some(first) = shares.first() else {
        return Err(CryptoError::InvalidShares("no shares provided".into()));
    };
    let len = first.as_ref().len();
    let mut secret = Zeroizing::new(vec![0u8; len]);
    for share in shares {
        let share = share.as_ref();
        if share.len() != len {
            return Err(CryptoError::InvalidShares("share length mismatch".into()));
        }
        for (s, b) in secret.iter_mut().zip(share.iter()) {
            *s ^= b;
        }
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gf_mul_identities() {
        for a in 0..=255u8 {
            assert_eq!(gf_mul(a, 1), a);
            assert_eq!(gf_mul(a, 0), 0);
        }
        // AES field sanity: 0x53 * 0xca = 0x01.
        assert_eq!(gf_mul(0x53, 0xca), 0x01);
    }

    #[test]
    fn gf_inv_inverts() {
        for a in 1..=255u8 {
            assert_eq!(gf_mul(a, gf_inv(a)), 1);
        }
    }

    #[test]
    fn shamir_round_trip_exact_threshold() {
        let secret = b"thirty-two bytes of key material";
        let shares = split(secret, 5, 3).unwrap();
        let recovered = combine(&shares[..3]).unwrap();
        assert_eq!(recovered.as_slice(), secret);
    }

    #[test]
    fn shamir_any_subset_works() {
        let secret = [0xAB; 32];
        let shares = split(&secret, 5, 3).unwrap();
        let subset = [shares[4].clone(), shares[1].clone(), shares[3].clone()];
        let recovered = combine(&subset).unwrap();
        assert_eq!(recovered.as_slice(), &secret);
    }

    #[test]
    fn shamir_extra_shares_still_work() {
        let secret = [0x42; 16];
        let shares = split(&secret, 4, 2).unwrap();
        let recovered = combine(&shares).unwrap();
        assert_eq!(recovered.as_slice(), &secret);
    }

    #[test]
    fn shamir_below_threshold_reveals_nothing() {
        let secret = [0x42; 16];
        let shares = split(&secret, 5, 3).unwrap();
        let recovered = combine(&shares[..2]).unwrap();
        assert_ne!(recovered.as_slice(), &secret);
    }

    #[test]
    fn shamir_rejects_bad_parameters() {
        assert!(split(b"x", 3, 0).is_err());
        assert!(split(b"x", 3, 4).is_err());
        assert!(combine(&[]).is_err());
    }

    #[test]
    fn shamir_rejects_duplicate_indices() {
        let shares = split(b"secret", 3, 2).unwrap();
        let dup = [shares[0].clone(), shares[0].clone()];
        assert!(combine(&dup).is_err());
    }

    #[test]
    fn xor_round_trip() {
        let secret = b"data encryption key material here";
        let shares = xor_split(secret, 4).unwrap();
        assert_eq!(shares.len(), 4);
        let recovered = xor_combine(&shares).unwrap();
        assert_eq!(recovered.as_slice(), secret);
    }

    #[test]
    fn xor_single_share_is_the_secret() {
        let shares = xor_split(b"secret", 1).unwrap();
        assert_eq!(shares[0].as_slice(), b"secret");
    }

    #[test]
    fn xor_missing_share_reveals_nothing() {
        let secret = [0x42; 16];
        let shares = xor_split(&secret, 3).unwrap();
        let partial = xor_combine(&shares[..2]).unwrap();
        assert_ne!(partial.as_slice(), &secret);
    }
}
