pub mod entity;
pub mod validation;

pub use entity::{EntityService, FileImport, HAS_PART};
pub use validation::RequestValidator;
