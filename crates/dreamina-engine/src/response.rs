use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;

use crate::error::Error;
use crate::truncate_text;

const ERROR_BODY_MAX_CHARS: usize = 512;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub data: Option<ResponseData>,
}

/// The three documented payload shapes. A response should carry at most one
/// of these; when several are present the singular URL field wins because it
/// is the documented primary field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseData {
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub image: Option<String>,
}

/// Where the image bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Remote URL, fetched with a plain unauthenticated GET.
    Url(String),
    /// Base64-encoded bytes carried inline.
    Inline(String),
}

/// Resolves a raw response body to an image source. Terminal on first match:
/// `image_url`, then the first of `image_urls`, then inline `image`.
pub fn resolve(raw_body: &str) -> Result<ImageSource, Error> {
    let parsed: ApiResponse =
        serde_json::from_str(raw_body).map_err(|_| Error::MalformedResponse {
            body: truncate_text(raw_body, ERROR_BODY_MAX_CHARS),
        })?;
    let Some(data) = parsed.data else {
        return Err(Error::MalformedResponse {
            body: truncate_text(raw_body, ERROR_BODY_MAX_CHARS),
        });
    };

    let image_url = data.image_url.filter(|url| !url.is_empty());
    let first_of_list = data.image_urls.into_iter().find(|url| !url.is_empty());
    let inline = data.image.filter(|encoded| !encoded.is_empty());

    match (image_url, first_of_list, inline) {
        (Some(url), _, _) => Ok(ImageSource::Url(url)),
        (None, Some(url), _) => Ok(ImageSource::Url(url)),
        (None, None, Some(encoded)) => Ok(ImageSource::Inline(encoded)),
        (None, None, None) => Err(Error::NoImageData {
            body: truncate_text(raw_body, ERROR_BODY_MAX_CHARS),
        }),
    }
}

pub fn decode_inline(encoded: &str) -> Result<Vec<u8>, Error> {
    Ok(BASE64.decode(encoded.trim().as_bytes())?)
}
