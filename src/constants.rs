use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;

pub static START_TIME: Lazy<DateTime<Utc>> = Lazy::new(Utc::now);

/// Largest width or height a resize may ask for.
pub const MAX_RESIZE_DIMENSION: u32 = 4000;

/// Decoder guard against decompression bombs.
pub const MAX_DECODE_DIMENSION: u32 = 16384;

pub const DEFAULT_QUALITY: u8 = 90;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Sent on every outgoing fetch so image hosts that block bots still answer.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:90.0) Gecko/20100101 Firefox/90.0";
