pub mod api;
pub mod artifact;
pub mod error;
pub mod response;
pub mod sign;

pub use api::{Client, GenerateRequest, DEFAULT_API_BASE, DEFAULT_REGION, SERVICE};
pub use artifact::{ImageArtifact, Written};
pub use error::Error;
pub use response::{ApiResponse, ImageSource, ResponseData};
pub use sign::{Credentials, SignableRequest, SigningContext, ALGORITHM};

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
