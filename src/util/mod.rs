mod atomic;
mod url_validator;

pub use atomic::{atomic_copy, atomic_write};
pub use url_validator::{validate_url, UrlValidationError};
