//! Concrete tasks shipped with the crate.

pub mod flush_cdn;

pub use flush_cdn::{FlushCdnTask, RepoRecord};
