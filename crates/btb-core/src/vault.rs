//! Encrypted per-user credential storage.
//!
//! Tokens are sealed with ChaCha20Poly1305 under a process-wide key; only the
//! ciphertext ever reaches disk. A sealed value is
//! `base64(nonce) "." base64(ciphertext)`.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use sqlx::{Row, SqlitePool};

use crate::{config::Config, domain::UserId, errors::Error, Result};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Process-wide symmetric key for sealing user tokens.
#[derive(Clone)]
pub struct CipherKey([u8; KEY_LEN]);

impl CipherKey {
    /// Decode a base64 key from configuration (url-safe or standard alphabet).
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let trimmed = encoded.trim();
        let bytes = URL_SAFE_NO_PAD
            .decode(trimmed)
            .or_else(|_| STANDARD.decode(trimmed))
            .map_err(|e| Error::Config(format!("ENCRYPTION_KEY is not valid base64: {e}")))?;

        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| Error::Config("ENCRYPTION_KEY must decode to 32 bytes".to_string()))?;
        Ok(Self(key))
    }

    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Key from config, or a generated one persisted to the key file so a
    /// restart does not invalidate every stored credential.
    pub fn load_or_generate(cfg: &Config) -> Result<Self> {
        if let Some(encoded) = &cfg.encryption_key {
            return Self::from_base64(encoded);
        }

        if cfg.encryption_key_file.exists() {
            let encoded = std::fs::read_to_string(&cfg.encryption_key_file)?;
            return Self::from_base64(&encoded);
        }

        let key = Self::generate();
        std::fs::write(&cfg.encryption_key_file, URL_SAFE_NO_PAD.encode(key.0))?;
        tracing::warn!(
            path = %cfg.encryption_key_file.display(),
            "ENCRYPTION_KEY not set; generated a key and persisted it next to the database"
        );
        Ok(key)
    }
}

/// Per-user token storage. At most one live credential per user; storing a
/// new one overwrites the old atomically (single-row upsert).
#[derive(Clone)]
pub struct CredentialVault {
    pool: SqlitePool,
    key: CipherKey,
}

impl CredentialVault {
    pub fn new(pool: SqlitePool, key: CipherKey) -> Self {
        Self { pool, key }
    }

    pub async fn store(&self, user_id: UserId, token: &str) -> Result<()> {
        let sealed = self.seal(token)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO user_credentials (user_id, encrypted_token, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
               encrypted_token = excluded.encrypted_token,
               updated_at = excluded.updated_at",
        )
        .bind(user_id.0)
        .bind(&sealed)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Look up and decrypt; `None` if the user never configured a token.
    ///
    /// A `Decryption` error means the row exists but cannot be opened (corrupt
    /// data or rotated key); callers surface that as "not configured".
    pub async fn retrieve(&self, user_id: UserId) -> Result<Option<String>> {
        let row = sqlx::query("SELECT encrypted_token FROM user_credentials WHERE user_id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let sealed: String = row.get("encrypted_token");
        self.open(&sealed).map(Some)
    }

    /// Idempotent delete.
    pub async fn remove(&self, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM user_credentials WHERE user_id = ?")
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Existence check without decrypting.
    pub async fn has_credential(&self, user_id: UserId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM user_credentials WHERE user_id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// When the credential was first stored, for `/status`.
    pub async fn configured_at(&self, user_id: UserId) -> Result<Option<String>> {
        let row = sqlx::query("SELECT created_at FROM user_credentials WHERE user_id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("created_at")))
    }

    fn seal(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let aead = ChaCha20Poly1305::new(Key::from_slice(&self.key.0));
        let ciphertext = aead
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| Error::Decryption(format!("token encryption failed: {e}")))?;

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(nonce),
            URL_SAFE_NO_PAD.encode(ciphertext)
        ))
    }

    fn open(&self, sealed: &str) -> Result<String> {
        let (nonce_b64, ciphertext_b64) = sealed
            .split_once('.')
            .ok_or_else(|| Error::Decryption("malformed sealed token".to_string()))?;

        let nonce = URL_SAFE_NO_PAD
            .decode(nonce_b64)
            .map_err(|e| Error::Decryption(format!("bad nonce encoding: {e}")))?;
        if nonce.len() != NONCE_LEN {
            return Err(Error::Decryption("bad nonce length".to_string()));
        }

        let ciphertext = URL_SAFE_NO_PAD
            .decode(ciphertext_b64)
            .map_err(|e| Error::Decryption(format!("bad ciphertext encoding: {e}")))?;

        let aead = ChaCha20Poly1305::new(Key::from_slice(&self.key.0));
        let plaintext = aead
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| {
                Error::Decryption("ciphertext rejected (corrupt data or rotated key)".to_string())
            })?;

        String::from_utf8(plaintext)
            .map_err(|e| Error::Decryption(format!("token is not valid utf-8: {e}")))
    }
}
