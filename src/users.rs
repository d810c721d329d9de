//! Credential store: a single `users` table keyed by email.
//!
//! Passwords are stored as Argon2id PHC strings; plaintext never touches the
//! database.

use anyhow::{anyhow, Result};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use sqlx::SqlitePool;
use thiserror::Error;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Reasons a sign-up or sign-in request is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("please fill in all fields")]
    MissingFields,
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("password must be at least 6 characters")]
    PasswordTooShort,
    #[error("this email is already registered")]
    EmailTaken,
    #[error("incorrect email or password")]
    InvalidCredentials,
    #[error("invalid API key")]
    InvalidApiKey,
    #[error("an API key is required")]
    MissingApiKey,
}

/// Check a registration form before touching the database.
pub fn validate_registration(email: &str, password: &str, confirm: &str) -> Result<(), AuthError> {
    if email.trim().is_empty() || password.is_empty() || confirm.is_empty() {
        return Err(AuthError::MissingFields);
    }
    if password != confirm {
        return Err(AuthError::PasswordMismatch);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::PasswordTooShort);
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Insert a new user. Returns `false` when the email is already registered.
pub async fn create_user(pool: &SqlitePool, email: &str, password: &str) -> Result<bool> {
    let hash = hash_password(password)?;
    let result = sqlx::query(
        "INSERT INTO users (email, password_hash, created_at) VALUES (?, ?, ?) \
         ON CONFLICT(email) DO NOTHING",
    )
    .bind(email.trim())
    .bind(&hash)
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Returns `true` when the email exists and the password matches.
pub async fn validate_user(pool: &SqlitePool, email: &str, password: &str) -> Result<bool> {
    let stored: Option<String> =
        sqlx::query_scalar("SELECT password_hash FROM users WHERE email = ?")
            .bind(email.trim())
            .fetch_optional(pool)
            .await?;

    Ok(stored
        .map(|hash| verify_password(password, &hash))
        .unwrap_or(false))
}

/// Remove a user. Returns `false` when no such user exists.
pub async fn delete_user(pool: &SqlitePool, email: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM users WHERE email = ?")
        .bind(email.trim())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_users(pool: &SqlitePool) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok(n)
}
