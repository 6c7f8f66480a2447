// Library exports for panaroo-update
pub mod alignment;
pub mod annotations;
pub mod error;
pub mod frequency;
pub mod gff;
pub mod gml;
pub mod library;
pub mod locate;
pub mod merge;
pub mod rewrite;
pub mod update;

pub use error::UpdateError;
pub use update::{run, UpdateConfig};
