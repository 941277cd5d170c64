//! Domain models for the retail POS platform

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum whose
/// database representation is SCREAMING_SNAKE_CASE text.
macro_rules! text_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $label,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = $crate::models::ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($ty::$variant),)+
                    _ => Err($crate::models::ParseEnumError::new($kind, s)),
                }
            }
        }
    };
}

mod catalog;
mod finance;
mod purchase_order;
mod reconciliation;
mod sale;
mod stock;
mod user;

pub use catalog::*;
pub use finance::*;
pub use purchase_order::*;
pub use reconciliation::*;
pub use sale::*;
pub use stock::*;
pub use user::*;

/// Error returned when a stored or submitted enum label is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
