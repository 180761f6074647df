pub use crate::config::Configuration;
pub use crate::context::Context;
pub use crate::credentials::{AccessKeyId, AccessKeySecret, Credentials};
pub use crate::error::QsError;
pub use crate::reader::ObjectReader;
pub use crate::types::{BucketInfo, HeadObjectResult, ListObjectsResult, ObjectInfo};
pub use crate::writer::ObjectWriter;
