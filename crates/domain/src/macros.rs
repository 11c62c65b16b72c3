//! Macro for implementing Display and FromStr for status enums
//!
//! Status enums are stored as lowercase text columns, so every one of them
//! needs the same pair of conversions.
//!
//! # Example
//!
//! ```rust
//! use tidemark_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum LockState {
//!     Held,
//!     Released,
//! }
//!
//! impl_domain_status_conversions!(LockState {
//!     Held => "held",
//!     Released => "released",
//! });
//!
//! assert_eq!(LockState::Held.to_string(), "held");
//! assert_eq!("RELEASED".parse::<LockState>(), Ok(LockState::Released));
//! ```

/// Implements Display and FromStr traits for status enums
///
/// Parsing is case-insensitive; display is always the lowercase mapping.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
