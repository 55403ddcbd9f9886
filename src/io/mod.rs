//! Audio input types
//!
//! Raw PCM signals as handed over by the decoding collaborator, and the
//! fingerprints used to key the reference cache.

pub mod fingerprint;
pub mod signal;
