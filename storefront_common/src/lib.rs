//! Primitives shared by the storefront payment crates: the [`Cents`] money type, the [`Secret`] wrapper for
//! configuration values that must never be printed, and a handful of environment parsing helpers.
pub mod helpers;
mod money;
mod secret;

pub use money::{Cents, CentsConversionError, DEFAULT_CURRENCY_CODE};
pub use secret::Secret;
