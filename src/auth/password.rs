use std::sync::LazyLock;

use argon2::password_hash::{self, SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

/// Argon2id with the crate defaults (19 MiB, 2 passes).
fn argon() -> Argon2<'static> {
    Argon2::default()
}

/// PHC-encoded argon2id hash of `plain` with a fresh random salt.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    argon()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("hashing password: {e}"))
}

/// `Ok(false)` for a wrong password; `Err` only when the stored hash is
/// unusable.
pub fn verify_password(plain: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed =
        PasswordHash::new(stored).map_err(|e| anyhow::anyhow!("stored hash unreadable: {e}"))?;
    match argon().verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("verifying password: {e}")),
    }
}

static DUMMY_HASH: LazyLock<String> = LazyLock::new(|| {
    hash_password("portal-dummy-password").unwrap_or_else(|_| {
        // PHC-shaped fallback that never matches.
        "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$YmFkaGFzaGJhZGhhc2hiYWRoYXNoYmFkaGFzaGJhZA".to_owned()
    })
});

/// Hash verified when the login email is unknown, so both paths cost one
/// argon2 verification.
pub fn dummy_hash() -> &'static str {
    &DUMMY_HASH
}
