//! HMAC secret strength classification
//!
//! Weak key material is refused in [`TokenSettings::key_material`] before any
//! token is signed with it.
//!
//! [`TokenSettings::key_material`]: crate::config::TokenSettings::key_material

const MIN_SECRET_BYTES: usize = 32;
const STRONG_SECRET_BYTES: usize = 64;

/// Bits per byte below which a secret is weak regardless of length
const MIN_ENTROPY_BITS: f64 = 4.0;
const STRONG_ENTROPY_BITS: f64 = 5.0;

/// Longest tolerated run of repeated or ascending bytes
const MAX_RUN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretStrength {
    /// Refused
    Weak,
    /// Accepted with a warning
    Acceptable,
    Strong,
}

/// Classify an HMAC secret by length, byte entropy and trivial runs
pub fn validate_secret_strength(secret: &[u8]) -> SecretStrength {
    if secret.len() < MIN_SECRET_BYTES {
        return SecretStrength::Weak;
    }

    let entropy = entropy_bits_per_byte(secret);
    if entropy < MIN_ENTROPY_BITS
        || longest_run(secret, 0) > MAX_RUN
        || longest_run(secret, 1) > MAX_RUN
    {
        return SecretStrength::Weak;
    }

    if secret.len() >= STRONG_SECRET_BYTES && entropy >= STRONG_ENTROPY_BITS {
        SecretStrength::Strong
    } else {
        SecretStrength::Acceptable
    }
}

/// Shannon entropy of the byte histogram, 0.0 to 8.0
fn entropy_bits_per_byte(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut histogram = [0usize; 256];
    data.iter().for_each(|&b| histogram[usize::from(b)] += 1);

    let total = data.len() as f64;
    histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Length of the longest run where each byte is the previous plus `step`
/// ("aaaa" for step 0, "abcd" for step 1)
fn longest_run(data: &[u8], step: u8) -> usize {
    let mut longest = usize::from(!data.is_empty());
    let mut current = longest;

    for pair in data.windows(2) {
        if pair[0].checked_add(step) == Some(pair[1]) {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 1;
        }
    }

    longest
}
