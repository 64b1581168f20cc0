//! OTA Crypto - the integrity chain for manifests and firmware.
//!
//! Hash-then-sign: firmware integrity rests on a SHA-256 digest, and the
//! lowercase-hex digest string (UTF-8 encoded) is itself the object that gets
//! signed. Manifests are signed over their canonical (sorted-key) JSON bytes.

#![forbid(unsafe_code)]

mod canonical;
mod digest;
mod error;
mod keys;

pub mod base64_bytes;

pub use canonical::*;
pub use digest::*;
pub use error::*;
pub use keys::*;
