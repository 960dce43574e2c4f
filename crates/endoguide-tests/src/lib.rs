//! Integration test crate for EndoGuide.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on every endoguide library crate to verify they work together.

#[cfg(test)]
mod clinical;

#[cfg(test)]
mod device;

#[cfg(test)]
mod stream;
