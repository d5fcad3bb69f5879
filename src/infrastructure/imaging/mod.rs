pub mod codec;
pub mod engine;
pub mod extension;
pub mod format;
pub mod heif;
pub mod raster;

pub use codec::FormatCodec;
pub use engine::{Dimensions, EngineKind, ImageEngine, ImageHandle};
pub use extension::ExtensionValidator;
pub use format::{EncodeSettings, ImageFormat, Quality};
