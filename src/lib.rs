//! modsmith: Minecraft modpacks resolved from Modrinth, cached once per
//! machine and linked into game directories.

pub mod cache;
pub mod cleanup;
pub mod commands;
pub mod deploy;
pub mod download;
pub mod error;
pub mod export;
pub mod http;
pub mod pack;
pub mod registry;
pub mod resolve;
pub mod runtime;
