//! Session cookie generation.
//!
//! Grounded on `iperf_utils.py::make_cookie` / `iperf_control.py::make_cookie`.

use rand::Rng;

/// Alphabet the reference tool draws cookie characters from.
pub const ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Length in bytes of a cookie.
pub const COOKIE_SIZE: usize = 37;

/// Generate a 37-byte ASCII session cookie drawn uniformly from
/// [`ALPHABET`] using a non-cryptographic PRNG.
pub fn make_cookie() -> [u8; COOKIE_SIZE] {
    let mut rng = rand::thread_rng();
    let mut cookie = [0u8; COOKIE_SIZE];
    for byte in cookie.iter_mut() {
        let idx = rng.gen_range(0..ALPHABET.len());
        *byte = ALPHABET[idx];
    }
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_has_expected_length_and_alphabet() {
        for _ in 0..200 {
            let cookie = make_cookie();
            assert_eq!(cookie.len(), COOKIE_SIZE);
            for &b in cookie.iter() {
                assert!(ALPHABET.contains(&b), "byte {b} not in cookie alphabet");
            }
        }
    }
}
