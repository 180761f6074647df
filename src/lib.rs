#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

/// Client configuration (inline or YAML file)
pub use crate::config::Configuration;
/// The main entrypoint: bucket/object operations and stream factories
pub use crate::context::Context;
/// Access credentials
pub use crate::credentials::{AccessKeyId, AccessKeySecret, Credentials};
/// Error type and its caller-visible code mapping
pub use crate::error::{ErrorCode, QsError};
/// Streaming download handle
pub use crate::reader::ObjectReader;
/// Response objects
pub use crate::types::{BucketInfo, HeadObjectResult, ListObjectsResult, ObjectInfo};
/// Streaming multipart upload handle
pub use crate::writer::ObjectWriter;

mod command;
mod config;
mod constants;
mod context;
mod credentials;
mod error;
mod fetcher;
mod pipeline;
pub mod prelude;
mod reader;
mod request;
mod signature;
mod types;
mod writer;
