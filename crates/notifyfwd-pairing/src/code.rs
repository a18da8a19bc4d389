//! One-time verification codes

use rand::Rng;

/// Number of digits in a verification code
pub const CODE_LENGTH: usize = 6;

/// Generate a 6-digit code, each digit drawn independently (leading zeros allowed)
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Whether `code` has the shape of a verification code
pub fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

/// Source of challenge codes
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Thread-local RNG backed generator
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCode;

impl CodeGenerator for RandomCode {
    fn generate(&self) -> String {
        generate_code()
    }
}

/// Always yields the same code
#[derive(Debug, Clone)]
pub struct FixedCode(pub String);

impl CodeGenerator for FixedCode {
    fn generate(&self) -> String {
        self.0.clone()
    }
}

/// Text field state for entering a code.
///
/// Values that are longer than six characters or contain anything other than
/// ASCII digits are not taken into the field; the previous value is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeEntry {
    value: String,
}

impl CodeEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a new field value; returns whether it was accepted
    pub fn update(&mut self, candidate: &str) -> bool {
        if candidate.len() <= CODE_LENGTH && candidate.bytes().all(|b| b.is_ascii_digit()) {
            self.value = candidate.to_string();
            true
        } else {
            false
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Submission is only possible with all six digits present
    pub fn is_complete(&self) -> bool {
        self.value.len() == CODE_LENGTH
    }

    pub fn clear(&mut self) {
        self.value.clear();
    }
}
