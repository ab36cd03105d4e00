//! IO modules - side effects (network, subprocesses)

pub mod fetch;
pub mod nix;

pub use fetch::{Fetcher, HttpFetcher};
pub use nix::{ContentAddresser, NixPrefetcher};
