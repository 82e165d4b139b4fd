//! Shared fixtures for the unit tests.
//!
//! Factories build small but complete metadata images and method bodies in memory, so tests do
//! not depend on binaries checked into the repository.

pub mod factories;
