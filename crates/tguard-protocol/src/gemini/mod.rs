pub mod error;
pub mod generate_content;

pub use error::{ErrorDetail, ErrorResponse};
pub use generate_content::{GenerateContentRequestBody, GenerateContentResponse};
