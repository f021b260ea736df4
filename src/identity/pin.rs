use crate::error::{AppError, AppResult};

pub const PIN_LENGTH: usize = 8;

/// A PIN credential. Holds the bcrypt hash, never the plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pin(String);

impl Pin {
    /// Validate and hash a plaintext PIN.
    pub fn hash(plaintext: &str, cost: u32) -> AppResult<Self> {
        validate(plaintext)?;
        let hash = bcrypt::hash(plaintext, cost)
            .map_err(|e| AppError::Internal(format!("PIN hashing failed: {}", e)))?;
        Ok(Self(hash))
    }

    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Constant-time via bcrypt. A malformed stored hash never matches.
    pub fn verify(&self, plaintext: &str) -> bool {
        bcrypt::verify(plaintext, &self.0).unwrap_or(false)
    }
}

/// Exactly eight ASCII digits.
pub fn validate(plaintext: &str) -> AppResult<()> {
    if plaintext.len() == PIN_LENGTH && plaintext.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(AppError::InvalidInput(format!(
            "PIN must be exactly {} digits",
            PIN_LENGTH
        )))
    }
}
