//! Small string and integer helpers

use rand::distr::{Alphanumeric, SampleString};
use rand::Rng;

/// Parse a non-negative decimal integer made of ASCII digits only
///
/// Signs, whitespace and overflow all yield `None`. Parsing stops at an
/// embedded NUL. The empty string parses as 0.
#[must_use]
pub fn parse_int(s: &str) -> Option<i32> {
    let digits = s.split('\0').next().unwrap_or_default();
    digits.bytes().try_fold(0i32, |acc, b| {
        if !b.is_ascii_digit() {
            return None;
        }
        acc.checked_mul(10)?.checked_add(i32::from(b - b'0'))
    })
}

/// Greatest common divisor by Stein's algorithm
#[must_use]
pub fn binary_gcd(mut u: u32, mut v: u32) -> u32 {
    if u == 0 {
        return v;
    }
    if v == 0 {
        return u;
    }
    let shift = (u | v).trailing_zeros();
    u >>= u.trailing_zeros();
    loop {
        v >>= v.trailing_zeros();
        if u > v {
            std::mem::swap(&mut u, &mut v);
        }
        v -= u;
        if v == 0 {
            return u << shift;
        }
    }
}

/// Split `s` at every character contained in `delims`
///
/// Empty fields are kept, so `n` delimiters always produce `n + 1` parts.
#[must_use]
pub fn split<'a>(s: &'a str, delims: &str) -> Vec<&'a str> {
    s.split(|c| delims.contains(c)).collect()
}

/// Replace every occurrence of `from` in `s` with `to`, in place
///
/// Replacement text is never rescanned. An empty `from` leaves `s` unchanged.
pub fn replace_all(s: &mut String, from: &str, to: &str) {
    if from.is_empty() || !s.contains(from) {
        return;
    }
    *s = s.replace(from, to);
}

/// Generate a random alphanumeric string
///
/// With `varlen` the length is drawn uniformly from `len / 2 ..= len`.
#[must_use]
pub fn gen_rand_str(len: usize, varlen: bool) -> String {
    let mut rng = rand::rng();
    let len = if varlen && len > 0 {
        rng.random_range(len / 2..=len)
    } else {
        len
    };
    Alphanumeric.sample_string(&mut rng, len)
}

/// Round `v` up to a multiple of `align`, which must be a power of two
#[must_use]
pub const fn align_to(v: usize, align: usize) -> usize {
    (v + align - 1) & !(align - 1)
}

/// Bytes needed to pad `v` up to a multiple of `align`
#[must_use]
pub const fn align_padding(v: usize, align: usize) -> usize {
    align_to(v, align) - v
}
