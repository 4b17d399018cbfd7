//! Key hierarchy and wrapped key material.
//!
//! The envelope chain is client-side end to end: a master key derived from
//! the master password (never transmitted) wraps a random user key; the
//! user key wraps per-item keys and unwraps any organization key the user
//! was granted; the organization key encrypts organization-item data. The
//! server stores only *wrapped* key material — [`EncString`] blobs it can
//! parse but never decrypt — plus the KDF parameters a client needs to
//! re-derive the master key.
//!
//! The one credential the server does verify is the authentication hash, a
//! client-side derivation of the master key. It arrives pre-hashed and is
//! re-hashed server-side ([`MasterPasswordHash`]) so a database leak never
//! exposes an offline-verifiable value directly.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

use crate::error::{CredentialError, KeyError};
use crate::kdf::KdfConfig;

/// Wrapped-key versions this server accepts.
///
/// Version 2 is AES-256-CBC with an HMAC-SHA256 tag, the only scheme
/// current clients produce.
const SUPPORTED_ENC_VERSIONS: &[u8] = &[2];

/// A wrapped (encrypted) symmetric key or blob in the uniform
/// `"<version>.<iv>|<ciphertext>|<mac>"` convention.
///
/// Used for `protected_user_key`, every per-member `encrypted_org_key`
/// copy, and item `data` blobs alike. The server validates the shape so a
/// corrupt write is caught at the boundary, but the payload is opaque —
/// nothing server-side can decrypt it.
///
/// # Examples
///
/// ```
/// use latchkey_vault::keys::EncString;
///
/// let enc: EncString = "2.YWJj|ZGVm|Z2hp".parse().unwrap();
/// assert_eq!(enc.version(), 2);
/// assert_eq!(enc.to_string(), "2.YWJj|ZGVm|Z2hp");
///
/// assert!("not-a-key".parse::<EncString>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EncString {
    version: u8,
    iv: String,
    ciphertext: String,
    mac: String,
}

impl EncString {
    /// The envelope version prefix.
    pub fn version(&self) -> u8 {
        self.version
    }

    fn decode_segment(segment: &str) -> Result<(), KeyError> {
        if segment.is_empty() {
            return Err(KeyError::MalformedEncString);
        }
        BASE64
            .decode(segment)
            .map(|_| ())
            .map_err(|_| KeyError::MalformedEncString)
    }
}

impl std::str::FromStr for EncString {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (version, rest) = s.split_once('.').ok_or(KeyError::MalformedEncString)?;
        let version: u8 = version.parse().map_err(|_| KeyError::MalformedEncString)?;
        if !SUPPORTED_ENC_VERSIONS.contains(&version) {
            return Err(KeyError::UnsupportedVersion { version });
        }

        let mut parts = rest.split('|');
        let (iv, ciphertext, mac) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(iv), Some(ct), Some(mac), None) => (iv, ct, mac),
            _ => return Err(KeyError::MalformedEncString),
        };

        for segment in [iv, ciphertext, mac] {
            Self::decode_segment(segment)?;
        }

        Ok(Self {
            version,
            iv: iv.to_string(),
            ciphertext: ciphertext.to_string(),
            mac: mac.to_string(),
        })
    }
}

impl std::fmt::Display for EncString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}|{}|{}", self.version, self.iv, self.ciphertext, self.mac)
    }
}

impl TryFrom<String> for EncString {
    type Error = KeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EncString> for String {
    fn from(enc: EncString) -> Self {
        enc.to_string()
    }
}

/// The client-derived authentication hash, as presented on the wire.
///
/// Already one KDF derivation away from the master password, but still a
/// brute-forceable verifier — so it is zeroized on drop and re-hashed
/// before storage.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ClientAuthHash(String);

impl ClientAuthHash {
    /// Wraps a presented authentication hash.
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for ClientAuthHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the verifier.
        f.write_str("ClientAuthHash(..)")
    }
}

/// The server-side verifier for a user's master password.
///
/// Stores an Argon2id re-hash (PHC string) of the client authentication
/// hash. Verification is constant-time; any failure mode collapses to
/// [`CredentialError::Unauthorized`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MasterPasswordHash(String);

/// A well-formed PHC string matching no credential. Parameters mirror
/// [`MasterPasswordHash::derive`] so verification against it costs the
/// same Argon2 work as a real mismatch.
const DECOY_PHC: &str = "$argon2id$v=19$m=19456,t=2,p=1\
     $c2FsdHNhbHRzYWx0c2FsdA$MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY";

impl MasterPasswordHash {
    /// Re-hashes a client authentication hash for storage.
    pub fn derive(presented: &ClientAuthHash) -> Result<Self, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(presented.as_bytes(), &salt)
            .map_err(CredentialError::Hash)?;
        Ok(Self(hash.to_string()))
    }

    /// Reconstructs a verifier from its stored PHC string.
    pub fn from_stored(phc: impl Into<String>) -> Self {
        Self(phc.into())
    }

    /// A verifier that matches no credential.
    ///
    /// Lookups that must not reveal whether an account exists verify
    /// the presented hash against this instead of returning early.
    pub fn decoy() -> Self {
        Self(DECOY_PHC.to_string())
    }

    /// The stored PHC string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verifies a presented authentication hash against this verifier.
    ///
    /// An unreadable stored verifier and a mismatch are indistinguishable
    /// to the caller.
    pub fn verify(&self, presented: &ClientAuthHash) -> Result<(), CredentialError> {
        let parsed = PasswordHash::new(&self.0).map_err(|_| CredentialError::Unauthorized)?;
        Argon2::default()
            .verify_password(presented.as_bytes(), &parsed)
            .map_err(|_| CredentialError::Unauthorized)
    }
}

/// A re-wrapped organization key for one membership, part of a rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotatedOrgKey {
    /// The membership row receiving the new wrapped copy.
    pub org_user_id: Uuid,
    /// The organization key re-wrapped under the user's new user key.
    pub encrypted_org_key: EncString,
}

/// A master-password change, prepared entirely client-side.
///
/// The client re-derives its master key, re-wraps the user key, and
/// re-wraps the organization key of every membership it holds. Persistence
/// applies the whole payload in one transaction; [`Self::check_covers`]
/// rejects it up front if any membership would be left on the old
/// wrapping.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountKeyRotation {
    /// New client authentication hash (re-hashed before storage).
    pub new_auth_hash: String,
    /// The user key re-wrapped under the new master key.
    pub new_protected_user_key: EncString,
    /// New KDF parameters, if the client also upgraded them.
    pub new_kdf: Option<KdfConfig>,
    /// One re-wrapped organization key per membership.
    pub rewrapped_org_keys: Vec<RotatedOrgKey>,
}

impl AccountKeyRotation {
    /// Checks that this rotation covers exactly the given memberships.
    ///
    /// Missing, duplicate, and unknown membership ids all reject: applying
    /// any of them would either strand a membership on the old wrapping or
    /// write a copy nobody owns.
    pub fn check_covers(&self, membership_ids: &[Uuid]) -> Result<(), KeyError> {
        if self.rewrapped_org_keys.len() != membership_ids.len() {
            return Err(KeyError::IncompleteRotation);
        }

        let mut seen = std::collections::HashSet::with_capacity(self.rewrapped_org_keys.len());
        for rotated in &self.rewrapped_org_keys {
            if !membership_ids.contains(&rotated.org_user_id) || !seen.insert(rotated.org_user_id)
            {
                return Err(KeyError::IncompleteRotation);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "2.YWJjZGVm|Y2lwaGVydGV4dA==|bWFjbWFjbWFj";

    #[test]
    fn test_enc_string_roundtrip() {
        let enc: EncString = SAMPLE.parse().unwrap();
        assert_eq!(enc.version(), 2);
        assert_eq!(enc.to_string(), SAMPLE);
    }

    #[test]
    fn test_enc_string_rejects_malformed() {
        for bad in [
            "",
            "2",
            "2.",
            "2.abc",
            "2.a|b",
            "2.a|b|c|d",
            "2.!!!|Y2lwaGVy|bWFj",
            "x.YWJj|ZGVm|Z2hp",
        ] {
            assert!(bad.parse::<EncString>().is_err(), "accepted: {bad:?}");
        }
    }

    #[test]
    fn test_enc_string_rejects_unknown_version() {
        let err = "9.YWJj|ZGVm|Z2hp".parse::<EncString>().unwrap_err();
        assert_eq!(err, KeyError::UnsupportedVersion { version: 9 });
    }

    #[test]
    fn test_enc_string_serde() {
        let enc: EncString = SAMPLE.parse().unwrap();
        let json = serde_json::to_string(&enc).unwrap();
        assert_eq!(json, format!("\"{SAMPLE}\""));
        let back: EncString = serde_json::from_str(&json).unwrap();
        assert_eq!(back, enc);

        assert!(serde_json::from_str::<EncString>("\"garbage\"").is_err());
    }

    #[test]
    fn test_master_password_hash_verify() {
        let presented = ClientAuthHash::new("client-derived-auth-hash");
        let stored = MasterPasswordHash::derive(&presented).unwrap();

        assert!(stored.verify(&presented).is_ok());

        let wrong = ClientAuthHash::new("some-other-hash");
        assert!(matches!(
            stored.verify(&wrong),
            Err(CredentialError::Unauthorized)
        ));
    }

    #[test]
    fn test_decoy_verifier_burns_real_work() {
        // Must parse as a well-formed PHC string so the full Argon2
        // derivation runs, and must still reject every input.
        let decoy = MasterPasswordHash::decoy();
        assert!(PasswordHash::new(decoy.as_str()).is_ok());
        assert!(matches!(
            decoy.verify(&ClientAuthHash::new("anything")),
            Err(CredentialError::Unauthorized)
        ));
    }

    #[test]
    fn test_corrupt_verifier_is_unauthorized() {
        let stored = MasterPasswordHash::from_stored("not-a-phc-string");
        let presented = ClientAuthHash::new("anything");
        assert!(matches!(
            stored.verify(&presented),
            Err(CredentialError::Unauthorized)
        ));
    }

    #[test]
    fn test_client_auth_hash_debug_redacted() {
        let presented = ClientAuthHash::new("secret-value");
        assert_eq!(format!("{presented:?}"), "ClientAuthHash(..)");
    }

    fn rotation_for(ids: &[Uuid]) -> AccountKeyRotation {
        AccountKeyRotation {
            new_auth_hash: "hash".to_string(),
            new_protected_user_key: SAMPLE.parse().unwrap(),
            new_kdf: None,
            rewrapped_org_keys: ids
                .iter()
                .map(|id| RotatedOrgKey {
                    org_user_id: *id,
                    encrypted_org_key: SAMPLE.parse().unwrap(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_rotation_covers_all_memberships() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(rotation_for(&[a, b]).check_covers(&[a, b]).is_ok());
        assert!(rotation_for(&[]).check_covers(&[]).is_ok());
    }

    #[test]
    fn test_rotation_rejects_partial_or_stray() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        // Missing membership: b would keep the old wrapping.
        assert_eq!(
            rotation_for(&[a]).check_covers(&[a, b]),
            Err(KeyError::IncompleteRotation)
        );
        // Unknown membership id.
        assert_eq!(
            rotation_for(&[a, stranger]).check_covers(&[a, b]),
            Err(KeyError::IncompleteRotation)
        );
        // Duplicate entry.
        assert_eq!(
            rotation_for(&[a, a]).check_covers(&[a, b]),
            Err(KeyError::IncompleteRotation)
        );
    }
}
