//! User accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::kdf::{KdfConfig, KdfType};
use crate::keys::EncString;

/// A user account.
///
/// `partition` is the storage-partition name holding the user's personal
/// vault. It is assigned once, in the same transaction that creates the
/// account — a user row without a successfully created partition must
/// never exist (see the persistence crate's provisioning path).
///
/// The encryption fields follow the zero-knowledge model: the server
/// stores a re-hashed authentication verifier, a wrapped user key, and the
/// KDF parameters needed to re-derive the master key client-side. Nothing
/// here can decrypt vault data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub name: String,
    pub email: String,

    /// Immutable per-user storage partition name.
    #[serde(rename = "schema")]
    pub partition: String,

    /// Argon2 re-hash of the client authentication hash (PHC string).
    #[serde(skip_serializing)]
    pub master_password_hash: String,
    /// The user key wrapped by the client-derived master key.
    #[serde(skip_serializing)]
    pub protected_user_key: EncString,

    pub kdf_type: KdfType,
    pub kdf_iterations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kdf_memory: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kdf_parallelism: Option<u32>,
    /// Hex-encoded random salt, generated once at signup.
    #[serde(skip_serializing)]
    pub kdf_salt: String,

    pub is_verified: bool,
}

impl User {
    /// The user's KDF configuration as one value, for prelogin responses
    /// and policy checks.
    pub fn kdf_config(&self) -> KdfConfig {
        KdfConfig {
            kind: self.kdf_type,
            iterations: self.kdf_iterations,
            memory: self.kdf_memory,
            parallelism: self.kdf_parallelism,
            salt: self.kdf_salt.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            partition: "user_ab12cd34".to_string(),
            master_password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string(),
            protected_user_key: "2.YWJj|ZGVm|Z2hp".parse().unwrap(),
            kdf_type: KdfType::Pbkdf2Sha256,
            kdf_iterations: 600_000,
            kdf_memory: None,
            kdf_parallelism: None,
            kdf_salt: "ab".repeat(32),
            is_verified: true,
        }
    }

    #[test]
    fn test_kdf_config_extraction() {
        let user = sample_user();
        let config = user.kdf_config();
        assert_eq!(config.kind, KdfType::Pbkdf2Sha256);
        assert_eq!(config.iterations, 600_000);
        assert!(config.validate().is_ok());
        assert!(config.validate_salt().is_ok());
    }

    #[test]
    fn test_secret_fields_not_serialized() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert!(json.get("master_password_hash").is_none());
        assert!(json.get("protected_user_key").is_none());
        assert!(json.get("kdf_salt").is_none());
        assert_eq!(json["schema"], "user_ab12cd34");
    }
}
