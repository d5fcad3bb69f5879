pub mod image;
pub mod option_fields;
