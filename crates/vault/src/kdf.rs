//! Key-derivation policy.
//!
//! The server never derives keys itself — clients derive the master key
//! locally and only present its artifacts. What the server *does* own is
//! the policy: which KDF configurations are acceptable at enrollment
//! ([`KdfConfig::validate`]) and which previously stored configurations may
//! be handed out at prelogin without enabling a downgrade attack
//! ([`KdfConfig::validate_for_prelogin`]).

use serde::{Deserialize, Serialize};

use crate::error::KdfError;

/// PBKDF2-SHA256 iteration bounds (OWASP 2023 floor, sanity ceiling).
pub const PBKDF2_MIN_ITERATIONS: u32 = 600_000;
/// Default PBKDF2 iteration count for new enrollments.
pub const PBKDF2_DEFAULT_ITERATIONS: u32 = 600_000;
/// Upper bound: anything above this is a client bug, not extra security.
pub const PBKDF2_MAX_ITERATIONS: u32 = 2_000_000;

/// Argon2id time-cost bounds.
pub const ARGON2_MIN_ITERATIONS: u32 = 2;
pub const ARGON2_MAX_ITERATIONS: u32 = 10;
/// Argon2id memory bounds in MiB.
pub const ARGON2_MIN_MEMORY_MB: u32 = 16;
pub const ARGON2_MAX_MEMORY_MB: u32 = 1024;
/// Argon2id lane bounds.
pub const ARGON2_MIN_PARALLELISM: u32 = 1;
pub const ARGON2_MAX_PARALLELISM: u32 = 16;

/// Default Argon2id parameters for new enrollments.
pub const ARGON2_DEFAULT_ITERATIONS: u32 = 3;
pub const ARGON2_DEFAULT_MEMORY_MB: u32 = 64;
pub const ARGON2_DEFAULT_PARALLELISM: u32 = 4;

/// Required salt length in bytes (stored hex-encoded, so 64 hex chars).
pub const KDF_SALT_LEN: usize = 32;

/// The key-derivation function a user enrolled with.
///
/// Stored as a small integer (`0` = PBKDF2, `1` = Argon2id) for
/// compatibility with the persisted user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KdfType {
    /// PBKDF2 with SHA-256.
    Pbkdf2Sha256,
    /// Argon2id.
    Argon2id,
}

impl KdfType {
    /// Storage representation of this KDF type.
    pub fn as_i16(self) -> i16 {
        match self {
            KdfType::Pbkdf2Sha256 => 0,
            KdfType::Argon2id => 1,
        }
    }

    /// Parses the storage representation.
    pub fn from_i16(value: i16) -> Result<Self, KdfError> {
        match value {
            0 => Ok(KdfType::Pbkdf2Sha256),
            1 => Ok(KdfType::Argon2id),
            _ => Err(KdfError::UnsupportedType),
        }
    }
}

impl std::fmt::Display for KdfType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KdfType::Pbkdf2Sha256 => write!(f, "PBKDF2-SHA256"),
            KdfType::Argon2id => write!(f, "Argon2id"),
        }
    }
}

/// A user's key-derivation configuration.
///
/// Validated both at enrollment and at every subsequent credential
/// presentation — a configuration that was acceptable when stored is
/// re-checked each time it is about to be used, so policy tightening takes
/// effect without a migration.
///
/// # Examples
///
/// ```
/// use latchkey_vault::kdf::{KdfConfig, KdfType};
///
/// let config = KdfConfig::default_pbkdf2();
/// assert_eq!(config.kind, KdfType::Pbkdf2Sha256);
/// assert!(config.validate().is_ok());
/// assert!(config.validate_for_prelogin().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfConfig {
    /// Which KDF the client derives with.
    #[serde(rename = "kdf_type")]
    pub kind: KdfType,
    /// Iteration count (PBKDF2) or time cost (Argon2id).
    #[serde(rename = "kdf_iterations")]
    pub iterations: u32,
    /// Argon2id memory in MiB. Required for Argon2id, absent for PBKDF2.
    #[serde(rename = "kdf_memory", skip_serializing_if = "Option::is_none")]
    pub memory: Option<u32>,
    /// Argon2id lane count. Required for Argon2id, absent for PBKDF2.
    #[serde(rename = "kdf_parallelism", skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<u32>,
    /// Hex-encoded per-user random salt.
    #[serde(rename = "kdf_salt", default, skip_serializing_if = "String::is_empty")]
    pub salt: String,
}

impl KdfConfig {
    /// Default PBKDF2 configuration for new enrollments.
    pub fn default_pbkdf2() -> Self {
        Self {
            kind: KdfType::Pbkdf2Sha256,
            iterations: PBKDF2_DEFAULT_ITERATIONS,
            memory: None,
            parallelism: None,
            salt: String::new(),
        }
    }

    /// Default Argon2id configuration for new enrollments.
    pub fn default_argon2id() -> Self {
        Self {
            kind: KdfType::Argon2id,
            iterations: ARGON2_DEFAULT_ITERATIONS,
            memory: Some(ARGON2_DEFAULT_MEMORY_MB),
            parallelism: Some(ARGON2_DEFAULT_PARALLELISM),
            salt: String::new(),
        }
    }

    /// Validates this configuration against the full policy table.
    ///
    /// Used at enrollment and whenever a client submits new parameters
    /// (signup, master-password change). Rejects values below *and* above
    /// the accepted ranges.
    pub fn validate(&self) -> Result<(), KdfError> {
        match self.kind {
            KdfType::Pbkdf2Sha256 => self.validate_pbkdf2(),
            KdfType::Argon2id => self.validate_argon2(),
        }
    }

    fn validate_pbkdf2(&self) -> Result<(), KdfError> {
        if !(PBKDF2_MIN_ITERATIONS..=PBKDF2_MAX_ITERATIONS).contains(&self.iterations) {
            return Err(KdfError::OutOfRange {
                parameter: "iterations",
                min: PBKDF2_MIN_ITERATIONS as u64,
                max: PBKDF2_MAX_ITERATIONS as u64,
            });
        }
        Ok(())
    }

    fn validate_argon2(&self) -> Result<(), KdfError> {
        let memory = self.memory.ok_or(KdfError::MissingParameter {
            parameter: "memory",
        })?;
        let parallelism = self.parallelism.ok_or(KdfError::MissingParameter {
            parameter: "parallelism",
        })?;

        if !(ARGON2_MIN_ITERATIONS..=ARGON2_MAX_ITERATIONS).contains(&self.iterations) {
            return Err(KdfError::OutOfRange {
                parameter: "iterations",
                min: ARGON2_MIN_ITERATIONS as u64,
                max: ARGON2_MAX_ITERATIONS as u64,
            });
        }
        if !(ARGON2_MIN_MEMORY_MB..=ARGON2_MAX_MEMORY_MB).contains(&memory) {
            return Err(KdfError::OutOfRange {
                parameter: "memory",
                min: ARGON2_MIN_MEMORY_MB as u64,
                max: ARGON2_MAX_MEMORY_MB as u64,
            });
        }
        if !(ARGON2_MIN_PARALLELISM..=ARGON2_MAX_PARALLELISM).contains(&parallelism) {
            return Err(KdfError::OutOfRange {
                parameter: "parallelism",
                min: ARGON2_MIN_PARALLELISM as u64,
                max: ARGON2_MAX_PARALLELISM as u64,
            });
        }
        Ok(())
    }

    /// Validates a stored configuration before it is handed to a client
    /// at prelogin.
    ///
    /// Rejects configurations weaker than the current minimums, even if
    /// they were valid when stored: serving them would let an attacker who
    /// can tamper with stored parameters cheapen an offline brute-force
    /// (a KDF downgrade attack). Parameters *above* the current maximum
    /// are not a downgrade and still pass.
    pub fn validate_for_prelogin(&self) -> Result<(), KdfError> {
        let weak = match self.kind {
            KdfType::Pbkdf2Sha256 => self.iterations < PBKDF2_MIN_ITERATIONS,
            KdfType::Argon2id => {
                self.iterations < ARGON2_MIN_ITERATIONS
                    || self.memory.is_some_and(|m| m < ARGON2_MIN_MEMORY_MB)
                    || self
                        .parallelism
                        .is_some_and(|p| p < ARGON2_MIN_PARALLELISM)
            }
        };

        if weak {
            // Single fixed signal; the caller must not learn which bound tripped.
            return Err(KdfError::DowngradeDetected);
        }
        Ok(())
    }

    /// Validates the hex-encoded salt carried by this configuration.
    ///
    /// Enforced at enrollment only — the salt is generated once and is
    /// immutable thereafter.
    pub fn validate_salt(&self) -> Result<(), KdfError> {
        let bytes = hex::decode(&self.salt).map_err(|_| KdfError::InvalidSalt)?;
        if bytes.len() != KDF_SALT_LEN {
            return Err(KdfError::InvalidSalt);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argon2(iterations: u32, memory: u32, parallelism: u32) -> KdfConfig {
        KdfConfig {
            kind: KdfType::Argon2id,
            iterations,
            memory: Some(memory),
            parallelism: Some(parallelism),
            salt: String::new(),
        }
    }

    fn pbkdf2(iterations: u32) -> KdfConfig {
        KdfConfig {
            kind: KdfType::Pbkdf2Sha256,
            iterations,
            memory: None,
            parallelism: None,
            salt: String::new(),
        }
    }

    #[test]
    fn test_pbkdf2_bounds() {
        assert!(pbkdf2(599_999).validate().is_err());
        assert!(pbkdf2(600_000).validate().is_ok());
        assert!(pbkdf2(2_000_000).validate().is_ok());
        assert!(pbkdf2(2_000_001).validate().is_err());
    }

    #[test]
    fn test_pbkdf2_prelogin_downgrade() {
        assert_eq!(
            pbkdf2(599_999).validate_for_prelogin(),
            Err(KdfError::DowngradeDetected)
        );
        assert!(pbkdf2(600_000).validate_for_prelogin().is_ok());
        // Above the current maximum is not a downgrade: a config accepted
        // under an older, higher ceiling must still be servable.
        assert!(pbkdf2(2_000_000).validate_for_prelogin().is_ok());
        assert!(pbkdf2(2_000_001).validate_for_prelogin().is_ok());
    }

    #[test]
    fn test_argon2_bounds() {
        assert!(argon2(3, 64, 4).validate().is_ok());
        assert!(argon2(1, 64, 4).validate().is_err());
        assert!(argon2(2, 64, 4).validate().is_ok());
        assert!(argon2(10, 64, 4).validate().is_ok());
        assert!(argon2(11, 64, 4).validate().is_err());
        assert!(argon2(3, 15, 4).validate().is_err());
        assert!(argon2(3, 16, 4).validate().is_ok());
        assert!(argon2(3, 1024, 4).validate().is_ok());
        assert!(argon2(3, 1025, 4).validate().is_err());
        assert!(argon2(3, 64, 0).validate().is_err());
        assert!(argon2(3, 64, 16).validate().is_ok());
        assert!(argon2(3, 64, 17).validate().is_err());
    }

    #[test]
    fn test_argon2_requires_memory_and_parallelism() {
        let mut config = argon2(3, 64, 4);
        config.memory = None;
        assert_eq!(
            config.validate(),
            Err(KdfError::MissingParameter {
                parameter: "memory"
            })
        );

        let mut config = argon2(3, 64, 4);
        config.parallelism = None;
        assert_eq!(
            config.validate(),
            Err(KdfError::MissingParameter {
                parameter: "parallelism"
            })
        );
    }

    #[test]
    fn test_argon2_prelogin_downgrade() {
        assert_eq!(
            argon2(1, 64, 4).validate_for_prelogin(),
            Err(KdfError::DowngradeDetected)
        );
        assert_eq!(
            argon2(3, 8, 4).validate_for_prelogin(),
            Err(KdfError::DowngradeDetected)
        );
        assert_eq!(
            argon2(3, 64, 0).validate_for_prelogin(),
            Err(KdfError::DowngradeDetected)
        );
        assert!(argon2(3, 64, 4).validate_for_prelogin().is_ok());
    }

    #[test]
    fn test_downgrade_signal_does_not_vary() {
        let by_iterations = pbkdf2(1).validate_for_prelogin().unwrap_err();
        let by_memory = argon2(3, 1, 4).validate_for_prelogin().unwrap_err();
        assert_eq!(by_iterations.to_string(), by_memory.to_string());
    }

    #[test]
    fn test_salt_validation() {
        let mut config = pbkdf2(600_000);
        config.salt = "ab".repeat(KDF_SALT_LEN);
        assert!(config.validate_salt().is_ok());

        config.salt = "ab".repeat(KDF_SALT_LEN - 1);
        assert_eq!(config.validate_salt(), Err(KdfError::InvalidSalt));

        config.salt = "zz".repeat(KDF_SALT_LEN);
        assert_eq!(config.validate_salt(), Err(KdfError::InvalidSalt));
    }

    #[test]
    fn test_kdf_type_storage_roundtrip() {
        assert_eq!(KdfType::from_i16(0).unwrap(), KdfType::Pbkdf2Sha256);
        assert_eq!(KdfType::from_i16(1).unwrap(), KdfType::Argon2id);
        assert_eq!(KdfType::from_i16(7), Err(KdfError::UnsupportedType));
        assert_eq!(KdfType::Argon2id.as_i16(), 1);
    }

    #[test]
    fn test_defaults_pass_both_checks() {
        for config in [KdfConfig::default_pbkdf2(), KdfConfig::default_argon2id()] {
            assert!(config.validate().is_ok());
            assert!(config.validate_for_prelogin().is_ok());
        }
    }

    #[test]
    fn test_serde_field_names() {
        let config = KdfConfig::default_argon2id();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["kdf_type"], "argon2id");
        assert_eq!(json["kdf_iterations"], 3);
        assert_eq!(json["kdf_memory"], 64);
        assert_eq!(json["kdf_parallelism"], 4);
    }
}
