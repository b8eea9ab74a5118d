//! Identifier types and name validation.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

const MAX_IDENT_LEN: usize = 64;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a random identifier.
            #[must_use]
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::random()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                let uuid = Uuid::parse_str(s).map_err(Error::from)?;
                Ok(Self::from_uuid(uuid))
            }
        }
    };
}

uuid_id!(
    /// Identifier assigned to a tool when it is registered.
    ToolId
);

uuid_id!(
    /// Identifier returned to callers after a successful plugin upload.
    PluginId
);

impl From<ToolId> for PluginId {
    fn from(value: ToolId) -> Self {
        Self(value.0)
    }
}

/// Validates a tool or capability name.
///
/// Names double as function names in LLM tool-calling payloads, so they are
/// restricted to lowercase ASCII alphanumerics, dashes, and underscores.
///
/// # Errors
///
/// Returns [`Error::InvalidIdentifier`] describing the first rule violated.
pub fn validate_identifier(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidIdentifier {
            id: String::new(),
            reason: "identifier cannot be empty".into(),
        });
    }

    if id.len() > MAX_IDENT_LEN {
        return Err(Error::InvalidIdentifier {
            id: id.into(),
            reason: format!("identifier length must be <= {MAX_IDENT_LEN}"),
        });
    }

    if !id
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-' | '_'))
    {
        return Err(Error::InvalidIdentifier {
            id: id.into(),
            reason: "identifier must contain lowercase alphanumeric, dash, or underscore".into(),
        });
    }

    if id.contains("__") {
        return Err(Error::InvalidIdentifier {
            id: id.into(),
            reason: "identifier cannot contain a double underscore".into(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_tool_id() {
        let id = ToolId::random();
        let parsed = id.to_string().parse::<ToolId>().expect("parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn identifier_rules() {
        assert!(validate_identifier("weather").is_ok());
        assert!(validate_identifier("get_current-v2").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("Weather").is_err());
        assert!(validate_identifier("a.b").is_err());
        assert!(validate_identifier("a__b").is_err());
        assert!(validate_identifier(&"x".repeat(65)).is_err());
    }
}
