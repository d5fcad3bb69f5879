pub mod images;
pub mod pipeline;
