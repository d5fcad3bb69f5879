pub mod image;
pub mod memory;
pub mod sqlx_repo;
