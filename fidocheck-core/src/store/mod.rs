//! Reference implementations of the [`crate::ports`] traits.

pub mod memory;

pub use memory::{InMemoryChallengeRepository, InMemoryCredentialStore};
