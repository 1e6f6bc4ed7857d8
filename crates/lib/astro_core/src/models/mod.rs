//! Domain models shared by the query modules and the HTTP layer.
//!
//! Status-like columns are stored as `TEXT` and mapped to closed enums through
//! `text_enum!`, which also provides the `TryFrom<String>` impl used by
//! `#[sqlx(try_from = "String")]` on row structs.

use thiserror::Error;

/// A stored or submitted value that is not one of an enum's known variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        $vis enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Stable wire/storage representation.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::models::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::models::UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::models::UnknownVariant;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

pub mod auth;
pub mod billing;
pub mod chat;
pub mod marketplace;

/// Clamp a caller-supplied page size into `1..=max`, defaulting when absent.
pub fn clamp_take(take: Option<i64>, default: i64, max: i64) -> i64 {
    take.unwrap_or(default).clamp(1, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_is_clamped() {
        assert_eq!(clamp_take(None, 50, 200), 50);
        assert_eq!(clamp_take(Some(0), 50, 200), 1);
        assert_eq!(clamp_take(Some(-4), 50, 200), 1);
        assert_eq!(clamp_take(Some(10_000), 50, 200), 200);
        assert_eq!(clamp_take(Some(7), 50, 200), 7);
    }
}
