//! Choosing versions: one project at a time, then the whole dependency closure.

pub mod compat;
mod dependency;
mod version;

pub use compat::CompatibilityRule;
pub use dependency::{DependencyResolver, Resolution};
pub use version::{ModRequest, ResolvedVersion, VersionResolver, newest, pick_search_hit};
