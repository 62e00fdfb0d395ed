//! RS256 signing keys, their JWKS form, and rotation.
//!
//! The ring itself is immutable. Rotation builds a new ring and swaps the
//! `Arc` behind the lock, so a reader holding a snapshot always sees one
//! consistent key set.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::{
    pkcs1::DecodeRsaPrivateKey,
    pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding},
    traits::PublicKeyParts,
    RsaPrivateKey, RsaPublicKey,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, RwLock};
use utoipa::ToSchema;

/// Size of keys minted by rotation.
const ROTATED_KEY_BITS: usize = 2048;

/// JWK (JSON Web Key) representation of a verification key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct JsonWebKey {
    pub kty: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub kid: String,
    pub alg: String,
    pub n: String,
    pub e: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}

/// One signing key with everything needed to sign, verify and publish it.
pub struct SigningKey {
    pub kid: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
    jwk: JsonWebKey,
    pub created_at: DateTime<Utc>,
    /// Set once a newer key takes over signing.
    pub retired_at: Option<DateTime<Utc>>,
}

impl SigningKey {
    /// Load a PKCS#8 or PKCS#1 PEM private key.
    pub fn from_pem(pem: &str, kid: Option<&str>) -> Result<Self, anyhow::Error> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| anyhow::anyhow!("Failed to parse RSA private key: {}", e))?;
        let encoding = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to build encoding key: {}", e))?;
        Self::assemble(&private_key, encoding, kid)
    }

    /// Generate a fresh key. CPU heavy; run off the async workers.
    pub fn generate(bits: usize) -> Result<Self, anyhow::Error> {
        let mut rng = rand::rngs::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| anyhow::anyhow!("Failed to generate RSA key: {}", e))?;
        let pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| anyhow::anyhow!("Failed to encode RSA key: {}", e))?;
        let encoding = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to build encoding key: {}", e))?;
        Self::assemble(&private_key, encoding, None)
    }

    fn assemble(
        private_key: &RsaPrivateKey,
        encoding: EncodingKey,
        kid: Option<&str>,
    ) -> Result<Self, anyhow::Error> {
        let public_key = RsaPublicKey::from(private_key);
        let n_bytes = public_key.n().to_bytes_be();
        let e_bytes = public_key.e().to_bytes_be();

        let kid = match kid {
            Some(kid) => kid.to_string(),
            None => {
                let mut hasher = Sha256::new();
                hasher.update(&n_bytes);
                hasher.update(&e_bytes);
                hex::encode(&hasher.finalize()[..8])
            }
        };

        let n = URL_SAFE_NO_PAD.encode(&n_bytes);
        let e = URL_SAFE_NO_PAD.encode(&e_bytes);
        let decoding = DecodingKey::from_rsa_components(&n, &e)
            .map_err(|e| anyhow::anyhow!("Failed to build decoding key: {}", e))?;

        Ok(Self {
            jwk: JsonWebKey {
                kty: "RSA".to_string(),
                key_use: "sig".to_string(),
                kid: kid.clone(),
                alg: "RS256".to_string(),
                n,
                e,
            },
            kid,
            encoding,
            decoding,
            created_at: Utc::now(),
            retired_at: None,
        })
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    pub fn jwk(&self) -> &JsonWebKey {
        &self.jwk
    }

    fn retired(&self, at: DateTime<Utc>) -> Self {
        Self {
            kid: self.kid.clone(),
            encoding: self.encoding.clone(),
            decoding: self.decoding.clone(),
            jwk: self.jwk.clone(),
            created_at: self.created_at,
            retired_at: Some(at),
        }
    }
}

/// Immutable key set: one active signer plus retired verifiers.
pub struct KeyRing {
    active: Arc<SigningKey>,
    retired: Vec<Arc<SigningKey>>,
}

impl KeyRing {
    pub fn active(&self) -> &SigningKey {
        &self.active
    }

    pub fn find(&self, kid: &str) -> Option<&SigningKey> {
        std::iter::once(&self.active)
            .chain(self.retired.iter())
            .find(|k| k.kid == kid)
            .map(|k| k.as_ref())
    }

    pub fn jwks(&self) -> JsonWebKeySet {
        JsonWebKeySet {
            keys: std::iter::once(&self.active)
                .chain(self.retired.iter())
                .map(|k| k.jwk.clone())
                .collect(),
        }
    }
}

/// Process-wide holder of the current `KeyRing`.
pub struct KeyStore {
    ring: RwLock<Arc<KeyRing>>,
    /// How long a retired key keeps verifying.
    retention: Duration,
}

impl KeyStore {
    pub fn new(initial: SigningKey, retention_seconds: i64) -> Self {
        Self {
            ring: RwLock::new(Arc::new(KeyRing {
                active: Arc::new(initial),
                retired: Vec::new(),
            })),
            retention: Duration::seconds(retention_seconds),
        }
    }

    /// Read the key file at `path`.
    pub fn from_file(
        path: &str,
        kid: Option<&str>,
        retention_seconds: i64,
    ) -> Result<Self, anyhow::Error> {
        let pem = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read private key from {}: {}", path, e))?;
        let key = SigningKey::from_pem(&pem, kid)?;
        tracing::info!(kid = %key.kid, "Loaded RS256 signing key");
        Ok(Self::new(key, retention_seconds))
    }

    pub fn snapshot(&self) -> Arc<KeyRing> {
        match self.ring.read() {
            Ok(ring) => ring.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Make `key` the signer; the previous signer is retired and expired
    /// retirees are dropped.
    pub fn install(&self, key: SigningKey) {
        let now = Utc::now();
        let current = self.snapshot();

        let mut retired: Vec<Arc<SigningKey>> = current
            .retired
            .iter()
            .filter(|k| {
                k.retired_at
                    .map(|at| at + self.retention > now)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        retired.insert(0, Arc::new(current.active.retired(now)));

        let next = Arc::new(KeyRing {
            active: Arc::new(key),
            retired,
        });
        match self.ring.write() {
            Ok(mut ring) => *ring = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Generate and install a new key, returning its kid.
    pub async fn rotate(&self) -> Result<String, anyhow::Error> {
        let key = tokio::task::spawn_blocking(|| SigningKey::generate(ROTATED_KEY_BITS)).await??;
        let kid = key.kid.clone();
        self.install(key);
        tracing::info!(kid = %kid, "Signing key rotated");
        Ok(kid)
    }
}
