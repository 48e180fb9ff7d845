// Password hashing for seeded accounts (bcrypt)
// Stored form is the standard `$2b$<cost>$<salt+digest>` string.

pub use bcrypt::BcryptError;

/// bcrypt work factor for seeded accounts.
pub const COST: u32 = 10;

/// Hash a plaintext password with a fresh random salt.
pub fn hash_password(plaintext: &str) -> Result<String, BcryptError> {
    bcrypt::hash(plaintext, COST)
}

/// Check a plaintext password against a stored hash.
/// Malformed stored values never verify.
pub fn verify_password(plaintext: &str, stored: &str) -> bool {
    bcrypt::verify(plaintext, stored).unwrap_or(false)
}
