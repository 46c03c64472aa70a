use crate::models::AnalyzeRequest;

/// Largest accepted image after base64 decoding: 4 MiB
pub const MAX_IMAGE_SIZE: usize = 4 * 1024 * 1024;

/// Longest accepted free-text context, in characters
pub const MAX_CONTEXT_CHARS: usize = 500;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid request format: {0}")]
    InvalidRequest(String),
    #[error("Image size ({:.2}MB) exceeds maximum allowed size of 4MB", megabytes(.size))]
    ImageTooLarge { size: usize },
}

fn megabytes(bytes: &usize) -> f64 {
    *bytes as f64 / 1024.0 / 1024.0
}

/// Parse and structurally validate a raw `POST /analyze` body.
/// Pure and local: nothing here talks to the network.
pub fn parse_request(body: &str) -> Result<AnalyzeRequest, ValidationError> {
    let request: AnalyzeRequest = serde_json::from_str(body)
        .map_err(|e| ValidationError::InvalidRequest(e.to_string()))?;

    if strip_data_url(&request.image).trim().is_empty() {
        return Err(ValidationError::InvalidRequest("image data required".to_string()));
    }

    if let Some(context) = &request.context {
        let chars = context.chars().count();
        if chars > MAX_CONTEXT_CHARS {
            return Err(ValidationError::InvalidRequest(format!(
                "context is {} characters, limit is {}",
                chars, MAX_CONTEXT_CHARS
            )));
        }
    }

    Ok(request)
}

/// Reject images whose decoded size exceeds [`MAX_IMAGE_SIZE`].
/// Returns the computed decoded size on success.
pub fn check_image_size(image: &str) -> Result<usize, ValidationError> {
    let size = decoded_size(image);
    if size > MAX_IMAGE_SIZE {
        return Err(ValidationError::ImageTooLarge { size });
    }
    Ok(size)
}

/// Byte length the base64 payload decodes to, computed from its length and
/// padding without materialising the binary. Line breaks and other
/// whitespace in wrapped base64 carry no data and are not counted.
pub fn decoded_size(image: &str) -> usize {
    let symbols = strip_data_url(image)
        .bytes()
        .filter(|b| !b.is_ascii_whitespace());

    let mut length: usize = 0;
    let mut padding = 0;
    for byte in symbols {
        length += 1;
        padding = if byte == b'=' { padding + 1 } else { 0 };
    }
    (length * 3 / 4).saturating_sub(padding)
}

/// Drop a `data:<mime>;base64,` prefix when present.
pub fn strip_data_url(image: &str) -> &str {
    match image.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(""),
        None => image,
    }
}
