#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod builder;
pub mod collector;
pub mod combiner;
pub mod config;
pub mod css;
pub mod error;
pub mod filter;
pub mod models;
pub mod monolith;
pub mod registry;
pub mod resolver;
pub mod urls;

pub use builder::{BuildOptions, BuildReport, BundleOutcome, BundleStatus, PrecompileBuilder};
pub use collector::FileCollector;
pub use combiner::{Combiner, Emission, WriteOutcome};
pub use config::{CombinerConfig, FingerprintKind};
pub use error::{CombinerError, Result};
pub use filter::{Filter, FilterConfig, FilterContext};
pub use models::{Bundle, BundleManifest, FileSet, MediaType, ResolvedBundleEntry};
pub use monolith::{PageCombiner, Registration};
pub use registry::{AssetResolver, BasePathResolver, BundleRegistry, BundleSource, Fingerprint};
pub use resolver::{BundleGraph, PositionHint};
