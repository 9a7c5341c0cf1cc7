use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a stored or submitted enum value is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Closed enums stored as SCREAMING_SNAKE_CASE text in the database and on the wire.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum!(
    /// What a complaint is about.
    Category, "category" {
        Technical => "TECHNICAL",
        Personnel => "PERSONNEL",
        Environment => "ENVIRONMENT",
        Equipment => "EQUIPMENT",
        Service => "SERVICE",
        Finance => "FINANCE",
        Safety => "SAFETY",
        Policy => "POLICY",
        Facility => "FACILITY",
        Other => "OTHER",
    }
);

text_enum!(
    Priority, "priority" {
        Low => "LOW",
        Medium => "MEDIUM",
        High => "HIGH",
        Urgent => "URGENT",
    }
);

text_enum!(
    /// Complaint lifecycle. New submissions always start at `New`.
    Status, "status" {
        New => "NEW",
        Received => "RECEIVED",
        InProgress => "IN_PROGRESS",
        Resolved => "RESOLVED",
        Closed => "CLOSED",
    }
);

text_enum!(
    /// Staff roles. Viewers are read-only across admin surfaces.
    Role, "role" {
        Admin => "ADMIN",
        Viewer => "VIEWER",
    }
);

impl Default for Status {
    fn default() -> Self {
        Status::New
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_enums_have_expected_cardinality() {
        assert_eq!(Category::ALL.len(), 10);
        assert_eq!(Priority::ALL.len(), 4);
        assert_eq!(Status::ALL.len(), 5);
    }

    #[test]
    fn text_round_trips_through_from_str() {
        for status in Status::ALL {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), *status);
        }
        assert_eq!("IN_PROGRESS".parse::<Status>().unwrap(), Status::InProgress);
    }

    #[test]
    fn unknown_values_are_rejected() {
        let err = "technical".parse::<Category>().unwrap_err();
        assert_eq!(err.kind, "category");
        assert!("CRITICAL".parse::<Priority>().is_err());
    }

    #[test]
    fn serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        let role: Role = serde_json::from_str("\"VIEWER\"").unwrap();
        assert_eq!(role, Role::Viewer);
    }
}
