//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of an invitation record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvitationId(Uuid);

/// Single-use capability token embedded in the invitation deep link.
///
/// Consumed by the (external) signup flow; this system only mints and
/// renders it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvitationToken(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal, $ctor:expr) => {
        impl $t {
            /// Create a new identifier.
            pub fn new() -> Self {
                Self($ctor)
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::validation(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

// Invitation ids are time-ordered (v7) so `ORDER BY id` roughly matches
// insertion order; tokens are v4 so they carry no timing information.
impl_uuid_newtype!(InvitationId, "InvitationId", Uuid::now_v7());
impl_uuid_newtype!(InvitationToken, "InvitationToken", Uuid::new_v4());

/// Human-readable batch identifier: `batch_{unix_millis}_{12 hex chars}`.
///
/// The millisecond prefix keeps batch listings sortable for operators; the
/// random suffix makes identifiers collision-resistant and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    /// Generate a fresh identifier anchored at `now`.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let token = Uuid::new_v4().simple().to_string();
        Self(format!("batch_{}_{}", now.timestamp_millis(), &token[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for BatchId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BatchId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(DomainError::validation("BatchId: empty"));
        }
        Ok(Self(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_id_carries_time_prefix_and_random_suffix() {
        let now = Utc::now();
        let a = BatchId::generate(now);
        let b = BatchId::generate(now);

        let prefix = format!("batch_{}_", now.timestamp_millis());
        assert!(a.as_str().starts_with(&prefix));
        assert!(b.as_str().starts_with(&prefix));
        // Same instant, different identifiers.
        assert_ne!(a, b);
    }

    #[test]
    fn batch_id_rejects_empty_input() {
        assert!("  ".parse::<BatchId>().is_err());
        assert!("batch_1_abc".parse::<BatchId>().is_ok());
    }

    #[test]
    fn invitation_id_round_trips_through_str() {
        let id = InvitationId::new();
        let parsed: InvitationId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
