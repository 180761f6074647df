pub const RFC1123_GMT: &[time::format_description::BorrowedFormatItem<'static>] =
    time::macros::format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );

pub const DEFAULT_HOST: &str = "qingstor.com";
pub const DEFAULT_LOCATION: &str = "pek3a";
pub const DEFAULT_PORT: u16 = 443;
pub const DEFAULT_PROTOCOL: &str = "https";
pub const DEFAULT_CONNECTION_RETRIES: u32 = 3;
pub const DEFAULT_NUM_CONNECTIONS: u32 = 3;
pub const DEFAULT_CHUNK_SIZE: u64 = 32 * 1024 * 1024;
pub const DEFAULT_LOG_LEVEL: &str = "debug";

/// A fetch buffer never grows past this, however large `chunk_size` is.
pub const MAX_FETCH_BUFFER: u64 = 128 * 1024 * 1024;

/// Granularity used to translate a byte buffer budget into a bounded
/// channel capacity; also the floor for single-connection reads.
pub const TRANSFER_FRAME_SIZE: u64 = 64 * 1024;
