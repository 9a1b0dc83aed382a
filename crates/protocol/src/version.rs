//! Controller/worker protocol version
//!
//! Postcard frames carry no field names or variant tags beyond indices, so a
//! worker can only decode what was written by the exact same message
//! definitions. Major and minor must match; the patch level is free for
//! changes that leave the wire format alone.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u8,
    /// Bumped for any wire change, additive ones included
    pub minor: u8,
    pub patch: u8,
}

pub const CURRENT_VERSION: ProtocolVersion = ProtocolVersion {
    major: 1,
    minor: 0,
    patch: 0,
};

impl ProtocolVersion {
    /// Whether a worker speaking `self` can decode frames from `controller`
    pub fn can_serve(&self, controller: &ProtocolVersion) -> bool {
        self.major == controller.major && self.minor == controller.minor
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Check the controller's version from a `StartRequest` against ours
///
/// The daemon re-executes its binary from disk, which may have been replaced
/// by an upgrade since the controller started.
pub fn validate_version(controller: &ProtocolVersion) -> Result<()> {
    if CURRENT_VERSION.can_serve(controller) {
        return Ok(());
    }
    Err(ProtocolError::IncompatibleVersion {
        major: controller.major,
        minor: controller.minor,
        expected_major: CURRENT_VERSION.major,
        expected_minor: CURRENT_VERSION.minor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_patch_may_differ() {
        let patched = ProtocolVersion {
            patch: CURRENT_VERSION.patch + 1,
            ..CURRENT_VERSION
        };
        let newer_minor = ProtocolVersion {
            minor: CURRENT_VERSION.minor + 1,
            ..CURRENT_VERSION
        };
        let other_major = ProtocolVersion {
            major: CURRENT_VERSION.major + 1,
            ..CURRENT_VERSION
        };

        assert!(CURRENT_VERSION.can_serve(&CURRENT_VERSION));
        assert!(CURRENT_VERSION.can_serve(&patched));
        assert!(patched.can_serve(&CURRENT_VERSION));
        assert!(!CURRENT_VERSION.can_serve(&newer_minor));
        assert!(!newer_minor.can_serve(&CURRENT_VERSION));
        assert!(!CURRENT_VERSION.can_serve(&other_major));
    }

    #[test]
    fn test_validate_version() {
        assert!(validate_version(&CURRENT_VERSION).is_ok());

        let newer_minor = ProtocolVersion {
            minor: CURRENT_VERSION.minor + 1,
            ..CURRENT_VERSION
        };
        match validate_version(&newer_minor) {
            Err(ProtocolError::IncompatibleVersion {
                minor,
                expected_minor,
                ..
            }) => {
                assert_eq!(minor, CURRENT_VERSION.minor + 1);
                assert_eq!(expected_minor, CURRENT_VERSION.minor);
            }
            other => panic!("expected a version error, got {:?}", other),
        }
    }

    #[test]
    fn test_version_display() {
        assert_eq!(CURRENT_VERSION.to_string(), "1.0.0");
    }
}
