pub mod metadata;
pub mod method;
