//! License key parsing, signing, and Ed25519 signature verification.
//!
//! License keys use the format: `base64url(payload).base64url(signature)`
//!
//! The payload is a JSON object containing:
//! - `sub`: licensee reference (optional, opaque)
//! - `did`: device id the key is bound to (optional; unbound keys bind on use)
//! - `plan`: license plan (trial/monthly/annual/perpetual, default perpetual)
//! - `iat`: issued-at timestamp (seconds since epoch)
//! - `exp`: explicit term end (seconds since epoch, optional)
//!
//! The signature covers `payload_b64.as_bytes()` (the base64url-encoded
//! payload string, not the decoded JSON). Unknown payload fields are ignored
//! so issuers can extend the schema without breaking deployed verifiers.

use crate::error::{LicenseError, LicenseResult};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use chrono::{DateTime, Utc};
use ed25519_dalek::pkcs8::DecodePublicKey;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Upper bound on an accepted key string; anything longer is malformed.
pub const MAX_KEY_LEN: usize = 4096;

/// The license plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicensePlan {
    /// Extended evaluation issued by the vendor.
    Trial,
    /// Monthly subscription.
    Monthly,
    /// Annual subscription.
    Annual,
    /// One-time purchase, never expires.
    #[default]
    Perpetual,
}

impl LicensePlan {
    /// Returns the term length in seconds, or None for perpetual.
    #[must_use]
    pub fn duration_secs(&self) -> Option<i64> {
        match self {
            Self::Trial => Some(14 * 24 * 60 * 60),
            Self::Monthly => Some(30 * 24 * 60 * 60),
            Self::Annual => Some(365 * 24 * 60 * 60),
            Self::Perpetual => None,
        }
    }

    /// Parses a plan name as used on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "trial" => Some(Self::Trial),
            "monthly" => Some(Self::Monthly),
            "annual" => Some(Self::Annual),
            "perpetual" => Some(Self::Perpetual),
            _ => None,
        }
    }
}

/// The decoded license payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicensePayload {
    /// Licensee reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Device id the key is bound to.
    #[serde(default, rename = "did", skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// License plan.
    #[serde(default)]
    pub plan: LicensePlan,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: i64,
    /// Explicit term end (seconds since epoch); overrides the plan duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl LicensePayload {
    /// Term end in seconds since epoch, or None for perpetual keys.
    #[must_use]
    pub fn expires_at_secs(&self) -> Option<i64> {
        self.exp.or_else(|| {
            self.plan
                .duration_secs()
                .map(|d| self.iat.saturating_add(d))
        })
    }
}

/// A parsed and verified license key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseKey {
    /// The raw key string (trimmed).
    raw: String,
    /// Decoded payload.
    payload: LicensePayload,
    /// Expiration timestamp (seconds since epoch), or None for perpetual.
    expires_at: Option<i64>,
}

impl LicenseKey {
    /// Parses and verifies a license key against a base64 public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the public key or the key format is invalid, or
    /// signature verification fails.
    pub fn parse(key: &str, public_key_b64: &str) -> LicenseResult<Self> {
        let verifying_key = decode_public_key(public_key_b64)?;
        Self::parse_with_key(key, &verifying_key)
    }

    /// Parses and verifies a license key string using a decoded public key.
    pub fn parse_with_key(key: &str, verifying_key: &VerifyingKey) -> LicenseResult<Self> {
        let key = key.trim();

        if key.len() > MAX_KEY_LEN {
            return Err(LicenseError::InvalidKeyFormat(format!(
                "key longer than {MAX_KEY_LEN} bytes"
            )));
        }

        let Some((payload_b64, signature_b64)) = key.split_once('.') else {
            return Err(LicenseError::InvalidKeyFormat(
                "key must have exactly two parts separated by a dot".to_string(),
            ));
        };
        if signature_b64.contains('.') {
            return Err(LicenseError::InvalidKeyFormat(
                "key must have exactly two parts separated by a dot".to_string(),
            ));
        }

        let sig_bytes = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|e| {
            LicenseError::InvalidKeyFormat(format!("invalid signature base64: {e}"))
        })?;

        let signature = Signature::from_slice(&sig_bytes).map_err(|_| {
            LicenseError::InvalidKeyFormat("invalid signature length".to_string())
        })?;

        verifying_key
            .verify(payload_b64.as_bytes(), &signature)
            .map_err(|_| LicenseError::InvalidSignature)?;

        let payload_json = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|e| {
            LicenseError::InvalidKeyFormat(format!("invalid payload base64: {e}"))
        })?;

        let payload: LicensePayload = serde_json::from_slice(&payload_json).map_err(|e| {
            LicenseError::InvalidPayload(format!("invalid payload JSON: {e}"))
        })?;

        let expires_at = payload.expires_at_secs();

        Ok(Self {
            raw: key.to_string(),
            payload,
            expires_at,
        })
    }

    /// Returns the raw key string.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns the decoded payload.
    #[must_use]
    pub fn payload(&self) -> &LicensePayload {
        &self.payload
    }

    /// Returns the license plan.
    #[must_use]
    pub fn license_plan(&self) -> LicensePlan {
        self.payload.plan
    }

    /// Device id the key is bound to, if any.
    #[must_use]
    pub fn bound_device(&self) -> Option<&str> {
        self.payload.device_id.as_deref()
    }

    /// Returns the expiration timestamp (seconds since epoch), or None for perpetual.
    #[must_use]
    pub fn expires_at_secs(&self) -> Option<i64> {
        self.expires_at
    }

    /// Returns the term end, or None for perpetual keys.
    ///
    /// A term end beyond chrono's representable range is clamped to the
    /// maximum instant.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .map(|secs| DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    /// SHA-256 hex digest of the raw key, used to remember retired keys
    /// without keeping them.
    #[must_use]
    pub fn digest(&self) -> String {
        key_digest(&self.raw)
    }
}

/// SHA-256 hex digest of a raw key string (whitespace-trimmed).
#[must_use]
pub fn key_digest(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.trim().as_bytes());
    hex::encode(hasher.finalize())
}

/// Decodes a base64 Ed25519 public key, either 32 raw bytes or a DER
/// SubjectPublicKeyInfo. Embedded whitespace (PEM-body style) is ignored.
pub fn decode_public_key(public_key_b64: &str) -> LicenseResult<VerifyingKey> {
    let compact: String = public_key_b64
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| LicenseError::Config(format!("public key is not base64: {e}")))?;

    if let Ok(raw) = <[u8; 32]>::try_from(bytes.as_slice()) {
        return VerifyingKey::from_bytes(&raw)
            .map_err(|_| LicenseError::Config("public key is not a valid Ed25519 point".into()));
    }

    VerifyingKey::from_public_key_der(&bytes)
        .map_err(|e| LicenseError::Config(format!("public key is not Ed25519 SPKI: {e}")))
}

/// Outcome of verifying a presented key blob.
///
/// Never carries an error: malformed input is simply `valid: false` with a
/// diagnostic `rejection`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Whether the signature verified and the payload decoded.
    pub valid: bool,
    /// The verified key, when valid.
    pub key: Option<LicenseKey>,
    /// Why the blob was refused, when invalid.
    pub rejection: Option<String>,
}

impl Verification {
    /// The verified payload, when valid.
    #[must_use]
    pub fn payload(&self) -> Option<&LicensePayload> {
        self.key.as_ref().map(LicenseKey::payload)
    }
}

/// Verifies license key blobs against the embedded public key.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    verifying_key: VerifyingKey,
}

impl SignatureVerifier {
    /// Builds a verifier from a base64 public key.
    pub fn new(public_key_b64: &str) -> LicenseResult<Self> {
        Ok(Self {
            verifying_key: decode_public_key(public_key_b64)?,
        })
    }

    /// Builds a verifier from an already decoded key.
    #[must_use]
    pub fn from_verifying_key(verifying_key: VerifyingKey) -> Self {
        Self { verifying_key }
    }

    /// Strict parse, surfacing the precise failure.
    pub fn parse(&self, blob: &str) -> LicenseResult<LicenseKey> {
        LicenseKey::parse_with_key(blob, &self.verifying_key)
    }

    /// Verifies a blob. Deterministic and infallible.
    #[must_use]
    pub fn verify(&self, blob: &str) -> Verification {
        match self.parse(blob) {
            Ok(key) => {
                debug!(plan = ?key.license_plan(), "license key signature verified");
                Verification {
                    valid: true,
                    key: Some(key),
                    rejection: None,
                }
            }
            Err(e) => {
                debug!(error = %e, "license key rejected by verifier");
                Verification {
                    valid: false,
                    key: None,
                    rejection: Some(e.to_string()),
                }
            }
        }
    }
}

/// Verifies `blob` against `public_key_b64` in one call.
///
/// An undecodable public key yields `valid: false` like any other failure.
#[must_use]
pub fn verify(blob: &str, public_key_b64: &str) -> Verification {
    match SignatureVerifier::new(public_key_b64) {
        Ok(verifier) => verifier.verify(blob),
        Err(e) => Verification {
            valid: false,
            key: None,
            rejection: Some(e.to_string()),
        },
    }
}

/// Issues license keys. Used by vendor tooling, never by the client engine.
pub struct LicenseSigner {
    signing_key: SigningKey,
}

impl LicenseSigner {
    /// Generates a fresh signing key from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// Builds a signer from a 32-byte seed.
    #[must_use]
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Builds a signer from a base64 32-byte seed.
    pub fn from_base64(seed_b64: &str) -> LicenseResult<Self> {
        let bytes = STANDARD
            .decode(seed_b64.trim())
            .map_err(|e| LicenseError::Config(format!("signing key is not base64: {e}")))?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| LicenseError::Config("signing key must be 32 bytes".into()))?;
        Ok(Self::from_seed(&seed))
    }

    /// Base64 of the signing seed, for storage by the issuer.
    #[must_use]
    pub fn seed_base64(&self) -> String {
        STANDARD.encode(self.signing_key.to_bytes())
    }

    /// Base64 of the raw verifying key, for embedding in [`crate::ShieldConfig`].
    #[must_use]
    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.signing_key.verifying_key().to_bytes())
    }

    /// The verifying key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Signs a payload into a key string.
    pub fn sign(&self, payload: &LicensePayload) -> LicenseResult<String> {
        let json = serde_json::to_vec(payload)?;
        Ok(self.sign_raw(&json))
    }

    /// Signs arbitrary payload bytes (test fixtures use this for malformed payloads).
    #[must_use]
    pub fn sign_raw(&self, payload_json: &[u8]) -> String {
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload_json);
        let signature = self.signing_key.sign(payload_b64.as_bytes());
        let sig_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());
        format!("{payload_b64}.{sig_b64}")
    }
}
