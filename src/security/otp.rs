//! One-time passcode generation
//!
//! Generation only. Comparing a supplied code with the stored one (and its
//! expiry) belongs to the session layer.

use rand::rngs::OsRng;
use rand::Rng;

pub const DEFAULT_OTP_LENGTH: usize = 6;

pub trait OtpGenerator: Send + Sync {
    fn generate(&self, length: usize) -> String;
}

/// Digits drawn independently and uniformly from the OS CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct SecureOtpGenerator;

impl OtpGenerator for SecureOtpGenerator {
    fn generate(&self, length: usize) -> String {
        let mut rng = OsRng;
        (0..length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }
}

/// Always hands out the same code. Test and demo use only.
#[derive(Debug, Clone)]
pub struct FixedOtpGenerator {
    code: String,
}

impl FixedOtpGenerator {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl OtpGenerator for FixedOtpGenerator {
    fn generate(&self, _length: usize) -> String {
        self.code.clone()
    }
}

pub fn generate_otp(length: usize) -> String {
    SecureOtpGenerator.generate(length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_shape() {
        for _ in 0..200 {
            let otp = generate_otp(DEFAULT_OTP_LENGTH);
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_digit_distribution_is_uniform() {
        // 10,000 codes → 60,000 digits, 6,000 expected per digit.
        let mut counts: HashMap<char, usize> = HashMap::new();
        for _ in 0..10_000 {
            for c in generate_otp(6).chars() {
                *counts.entry(c).or_default() += 1;
            }
        }
        assert_eq!(counts.len(), 10);

        let expected = 6_000.0;
        let chi_square: f64 = counts
            .values()
            .map(|&observed| {
                let diff = observed as f64 - expected;
                diff * diff / expected
            })
            .sum();
        // 9 degrees of freedom; 0.9999 quantile is ~33.7
        assert!(chi_square < 33.7, "chi-square too large: {}", chi_square);
    }

    #[test]
    fn test_codes_rarely_repeat() {
        let mut seen: HashMap<String, usize> = HashMap::new();
        for _ in 0..10_000 {
            *seen.entry(generate_otp(6)).or_default() += 1;
        }
        // 10^6 possible codes; a value drawn 5+ times in 10k draws is ~1e-12 likely.
        assert!(seen.values().all(|&n| n < 5));
    }

    #[test]
    fn test_fixed_generator() {
        assert_eq!(FixedOtpGenerator::new("123456").generate(6), "123456");
    }
}
