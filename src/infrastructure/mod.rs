pub mod db;
pub mod fetch;
pub mod imaging;
pub mod limiter;
pub mod storage;
pub mod utils;
