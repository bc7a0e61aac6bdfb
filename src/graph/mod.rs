pub mod forest;
pub mod resolver;

pub use forest::{ArtifactKind, Forest};
