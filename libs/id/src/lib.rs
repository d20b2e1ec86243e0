//! # staticpage-id
//!
//! Object identity for the StaticPage controller.
//!
//! ## Design Principles
//!
//! - Keys are user-controlled (`namespace/name`); UIDs are store-generated
//! - All identities have a canonical string representation with strict parsing
//! - UIDs are typed to prevent mixing different identity kinds
//!
//! ## UID Format
//!
//! Store-assigned identities use a prefixed format: `{prefix}_{ulid}`,
//! declared with the crate-private `prefixed_id!` macro.
//!
//! Examples:
//! - `uid_01HV4Z2WQXKJNM8GPQY6VBKC3D`
//! - `rec_01HV4Z3MXNKPQR9HSTZ7WCLD4E`
//!
//! Object keys use the `namespace/name` form, where both segments are
//! lowercase DNS-1123 labels (names may also contain dots).

mod error;
mod key;
mod macros;
mod types;

pub use error::IdError;
pub use key::ObjectKey;
pub use types::*;

