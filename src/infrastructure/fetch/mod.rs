pub mod remote_fetcher;

pub use remote_fetcher::{FetchedImage, RemoteFetcher};
