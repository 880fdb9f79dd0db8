//! Shamir secret sharing over GF(2^8)
//!
//! Each byte of the secret is the constant term of an independent random
//! polynomial of degree `threshold - 1`. Share `i` holds the evaluations at
//! `x = i` (1-based). Any `threshold` shares recover the secret through
//! Lagrange interpolation at zero; fewer reveal nothing about it.
//!
//! Field arithmetic uses the AES reduction polynomial x^8 + x^4 + x^3 + x + 1.

use crate::error::{SwarmError, SwarmResult};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One evaluation point of the sharing polynomials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub x: u8,
    pub y: Vec<u8>,
}

fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    let mut product = 0u8;
    while b != 0 {
        if b & 1 != 0 {
            product ^= a;
        }
        let carry = a & 0x80;
        a <<= 1;
        if carry != 0 {
            a ^= 0x1b;
        }
        b >>= 1;
    }
    product
}

/// a^254 = a^-1 for a ≠ 0
fn gf_inv(a: u8) -> u8 {
    let mut result = 1u8;
    let mut base = a;
    let mut exp = 254u8;
    while exp > 0 {
        if exp & 1 != 0 {
            result = gf_mul(result, base);
        }
        base = gf_mul(base, base);
        exp >>= 1;
    }
    result
}

fn eval_poly(coefficients: &[u8], x: u8) -> u8 {
    // Horner, highest degree first
    coefficients
        .iter()
        .rev()
        .fold(0u8, |acc, &c| gf_mul(acc, x) ^ c)
}

/// Split `secret` into `share_count` shares, any `threshold` of which recover it
pub fn split(secret: &[u8], threshold: usize, share_count: usize) -> SwarmResult<Vec<Share>> {
    if threshold == 0 || threshold > share_count {
        return Err(SwarmError::Crypto(format!(
            "threshold {} invalid for {} shares",
            threshold, share_count
        )));
    }
    if share_count > 255 {
        return Err(SwarmError::Crypto("at most 255 shares over GF(256)".into()));
    }

    let mut rng = rand::thread_rng();
    let mut shares: Vec<Share> = (1..=share_count as u8)
        .map(|x| Share { x, y: Vec::with_capacity(secret.len()) })
        .collect();

    let mut coefficients = vec![0u8; threshold];
    for &byte in secret {
        coefficients[0] = byte;
        rng.fill_bytes(&mut coefficients[1..]);
        for share in shares.iter_mut() {
            share.y.push(eval_poly(&coefficients, share.x));
        }
    }
    Ok(shares)
}

/// Recover the secret from shares (exactly the given ones are interpolated)
pub fn combine(shares: &[Share]) -> SwarmResult<Vec<u8>> {
    if shares.is_empty() {
        return Err(SwarmError::Crypto("no shares to combine".into()));
    }
    let len = shares[0].y.len();
    let mut seen = HashSet::new();
    for share in shares {
        if share.x == 0 || !seen.insert(share.x) {
            return Err(SwarmError::Crypto(format!("invalid or duplicate share x={}", share.x)));
        }
        if share.y.len() != len {
            return Err(SwarmError::Crypto("shares have mismatched lengths".into()));
        }
    }

    // Lagrange basis at zero: l_i(0) = Π_{j≠i} x_j / (x_j - x_i); subtraction is XOR
    let basis: Vec<u8> = shares
        .iter()
        .map(|si| {
            shares
                .iter()
                .filter(|sj| sj.x != si.x)
                .fold(1u8, |acc, sj| gf_mul(acc, gf_mul(sj.x, gf_inv(sj.x ^ si.x))))
        })
        .collect();

    Ok((0..len)
        .map(|byte| {
            shares
                .iter()
                .zip(&basis)
                .fold(0u8, |acc, (share, &l)| acc ^ gf_mul(share.y[byte], l))
        })
        .collect())
}
