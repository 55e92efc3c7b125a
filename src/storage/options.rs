//! Per-request policy: concurrency, consistency, features and the metadata keys the
//! engine understands.
//!
//! Wire layers map their enums or strings into these types through the `from_name`
//! functions below; anything unrecognized becomes `Unspecified`, which then resolves
//! to the documented default (`LastWrite`, `Eventual`).

use std::collections::HashMap;
use std::fmt;

use crate::storage::{StateError, StateResult};

/// Metadata key carrying a time-to-live in seconds.
pub const TTL_IN_SECONDS: &str = "ttlInSeconds";

/// Response metadata key carrying the RFC 3339 expiry of a record.
pub const TTL_EXPIRE_TIME: &str = "ttlExpireTime";

/// Write conflict policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Concurrency {
    #[default]
    Unspecified,
    /// The write applies only if the caller's ETag matches the stored one
    FirstWrite,
    /// The write always applies
    LastWrite,
}

impl Concurrency {
    /// Maps the string form used by flat wire schemas. Unknown names are `Unspecified`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "first-write" => Concurrency::FirstWrite,
            "last-write" => Concurrency::LastWrite,
            _ => Concurrency::Unspecified,
        }
    }

    /// The policy actually enforced: `Unspecified` means last-write-wins.
    pub fn effective(self) -> Self {
        match self {
            Concurrency::Unspecified => Concurrency::LastWrite,
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Concurrency::Unspecified => "",
            Concurrency::FirstWrite => "first-write",
            Concurrency::LastWrite => "last-write",
        }
    }
}

/// Visibility policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Consistency {
    #[default]
    Unspecified,
    /// May return before the write is durable
    Eventual,
    /// Waits on the durability barrier
    Strong,
}

impl Consistency {
    /// Maps the string form used by flat wire schemas. Unknown names are `Unspecified`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "eventual" => Consistency::Eventual,
            "strong" => Consistency::Strong,
            _ => Consistency::Unspecified,
        }
    }

    /// The policy actually enforced: `Unspecified` means eventual.
    pub fn effective(self) -> Self {
        match self {
            Consistency::Unspecified => Consistency::Eventual,
            other => other,
        }
    }

    pub fn is_strong(self) -> bool {
        self.effective() == Consistency::Strong
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Consistency::Unspecified => "",
            Consistency::Eventual => "eventual",
            Consistency::Strong => "strong",
        }
    }
}

/// Options attached to a write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StateOptions {
    pub concurrency: Concurrency,
    pub consistency: Consistency,
}

/// Optional capabilities an engine instance may advertise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    /// First-write-wins writes via ETags
    ETag,
    /// BulkSet and BulkDelete are all-or-nothing
    Transactional,
    /// `ttlInSeconds` metadata is honored
    Ttl,
    /// BulkGet is served natively
    BulkGet,
    /// Strong consistency waits on a durability barrier
    StrongConsistency,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::ETag => "ETAG",
            Feature::Transactional => "TRANSACTIONAL",
            Feature::Ttl => "TTL",
            Feature::BulkGet => "BULK_GET",
            Feature::StrongConsistency => "STRONG_CONSISTENCY",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reads `ttlInSeconds` from request metadata.
///
/// Returns the TTL in seconds, or `None` when the record should not expire (key
/// absent or `-1`). Zero, other negatives and non-integers are rejected.
pub fn ttl_from_metadata(metadata: &HashMap<String, String>) -> StateResult<Option<u64>> {
    let Some(raw) = metadata.get(TTL_IN_SECONDS) else {
        return Ok(None);
    };

    let ttl: i64 = raw.trim().parse().map_err(|_| {
        StateError::InvalidMetadata(format!("{TTL_IN_SECONDS} must be an integer, got {raw:?}"))
    })?;

    match ttl {
        -1 => Ok(None),
        ttl if ttl > 0 => Ok(Some(ttl as u64)),
        ttl => Err(StateError::InvalidMetadata(format!(
            "{TTL_IN_SECONDS} must be positive or -1, got {ttl}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(ttl: &str) -> HashMap<String, String> {
        HashMap::from([(TTL_IN_SECONDS.to_string(), ttl.to_string())])
    }

    #[test]
    fn test_concurrency_from_name() {
        assert_eq!(Concurrency::from_name("first-write"), Concurrency::FirstWrite);
        assert_eq!(Concurrency::from_name("last-write"), Concurrency::LastWrite);
        assert_eq!(Concurrency::from_name(""), Concurrency::Unspecified);
        assert_eq!(Concurrency::from_name("FIRST-WRITE"), Concurrency::Unspecified);
        assert_eq!(Concurrency::from_name("optimistic"), Concurrency::Unspecified);
    }

    #[test]
    fn test_concurrency_defaults_to_last_write() {
        for (mode, expected) in [
            (Concurrency::Unspecified, Concurrency::LastWrite),
            (Concurrency::FirstWrite, Concurrency::FirstWrite),
            (Concurrency::LastWrite, Concurrency::LastWrite),
        ] {
            assert_eq!(mode.effective(), expected, "{mode:?}");
        }
    }

    #[test]
    fn test_consistency_from_name() {
        assert_eq!(Consistency::from_name("eventual"), Consistency::Eventual);
        assert_eq!(Consistency::from_name("strong"), Consistency::Strong);
        assert_eq!(Consistency::from_name(""), Consistency::Unspecified);
        assert_eq!(Consistency::from_name("linearizable"), Consistency::Unspecified);
    }

    #[test]
    fn test_consistency_defaults_to_eventual() {
        for (mode, expected, strong) in [
            (Consistency::Unspecified, Consistency::Eventual, false),
            (Consistency::Eventual, Consistency::Eventual, false),
            (Consistency::Strong, Consistency::Strong, true),
        ] {
            assert_eq!(mode.effective(), expected, "{mode:?}");
            assert_eq!(mode.is_strong(), strong, "{mode:?}");
        }
    }

    #[test]
    fn test_names_round_trip() {
        for mode in [Concurrency::FirstWrite, Concurrency::LastWrite] {
            assert_eq!(Concurrency::from_name(mode.as_str()), mode);
        }
        for mode in [Consistency::Eventual, Consistency::Strong] {
            assert_eq!(Consistency::from_name(mode.as_str()), mode);
        }
    }

    #[test]
    fn test_feature_names() {
        assert_eq!(Feature::ETag.to_string(), "ETAG");
        assert_eq!(Feature::Transactional.to_string(), "TRANSACTIONAL");
        assert_eq!(Feature::Ttl.to_string(), "TTL");
        assert_eq!(Feature::BulkGet.to_string(), "BULK_GET");
        assert_eq!(Feature::StrongConsistency.to_string(), "STRONG_CONSISTENCY");
    }

    #[test]
    fn test_ttl_from_metadata() {
        assert_eq!(ttl_from_metadata(&HashMap::new()).unwrap(), None);
        assert_eq!(ttl_from_metadata(&metadata("30")).unwrap(), Some(30));
        assert_eq!(ttl_from_metadata(&metadata(" 5 ")).unwrap(), Some(5));
        assert_eq!(ttl_from_metadata(&metadata("-1")).unwrap(), None);

        for bad in ["0", "-2", "1.5", "soon", ""] {
            assert!(
                matches!(
                    ttl_from_metadata(&metadata(bad)),
                    Err(StateError::InvalidMetadata(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }
}
