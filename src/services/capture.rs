use anyhow::Result;
use image::{ImageFormat, RgbaImage};
use reqwest::header::{COOKIE, SET_COOKIE};
use std::path::Path;

use super::normalizer::{compress_image, CompressOptions, CompressedImage, ImageSource, NormalizeError};
use crate::api::{AuthResponse, LoginRequest};
use crate::handlers::session::SESSION_COOKIE;
use crate::models::{AnalyzeRequest, AnalyzeResponse, MimeType};

/// Capture-side failures. Their messages are shown to the user as-is and
/// never reach the server.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Unsupported file type. Please choose a JPEG, PNG or WebP image.")]
    UnsupportedFile,
    #[error("Image file not found: {0}")]
    NotFound(String),
    #[error("Permission denied while reading {0}")]
    PermissionDenied(String),
    #[error("Frame is {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    FrameSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("Could not process the image: {0}")]
    Processing(NormalizeError),
}

impl From<NormalizeError> for CaptureError {
    fn from(error: NormalizeError) -> Self {
        match error {
            NormalizeError::Io { path, source } => match source.kind() {
                std::io::ErrorKind::NotFound => CaptureError::NotFound(path.display().to_string()),
                std::io::ErrorKind::PermissionDenied => {
                    CaptureError::PermissionDenied(path.display().to_string())
                }
                _ => CaptureError::Processing(NormalizeError::Io { path, source }),
            },
            other => CaptureError::Processing(other),
        }
    }
}

/// Check the file type and compress the image for upload.
pub fn prepare_capture(path: &Path, options: &CompressOptions) -> Result<CompressedImage, CaptureError> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(MimeType::from_extension)
        .ok_or(CaptureError::UnsupportedFile)?;

    Ok(compress_image(ImageSource::File(path), options)?)
}

/// Same as [`prepare_capture`] for an image already in memory, e.g. piped
/// from a camera tool. The format is sniffed from the bytes.
pub fn prepare_capture_bytes(bytes: &[u8], options: &CompressOptions) -> Result<CompressedImage, CaptureError> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP) => {}
        _ => return Err(CaptureError::UnsupportedFile),
    }

    Ok(compress_image(ImageSource::Encoded(bytes), options)?)
}

/// Compress one raw RGBA camera frame (e.g. `ffmpeg -f rawvideo -pix_fmt rgba`).
pub fn prepare_frame(
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    options: &CompressOptions,
) -> Result<CompressedImage, CaptureError> {
    let expected = width as usize * height as usize * 4;
    let actual = pixels.len();
    let frame = RgbaImage::from_raw(width, height, pixels).filter(|_| actual == expected).ok_or(
        CaptureError::FrameSize {
            width,
            height,
            expected,
            actual,
        },
    )?;

    Ok(compress_image(ImageSource::Frame(&frame), options)?)
}

/// Authenticated session, held by the caller and passed to every request.
#[derive(Debug, Clone)]
pub struct Session {
    token: String,
}

impl Session {
    pub fn new(token: String) -> Self {
        Self { token }
    }

    fn cookie_header(&self) -> String {
        format!("{}={}", SESSION_COOKIE, self.token)
    }
}

/// HTTP client for the analyze service.
pub struct CaptureClient {
    base_url: String,
    client: reqwest::Client,
}

impl CaptureClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn login(&self, code: &str) -> Result<Session> {
        let response = self
            .client
            .post(format!("{}/auth", self.base_url))
            .json(&LoginRequest {
                code: Some(code.to_string()),
            })
            .send()
            .await?;

        let token = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(session_token_from_set_cookie);

        let body: AuthResponse = response.json().await?;
        if !body.success {
            anyhow::bail!("{}", body.error.unwrap_or_else(|| "Invalid code".to_string()));
        }

        let token = token.ok_or_else(|| anyhow::anyhow!("Server did not return a session cookie"))?;
        log::debug!("🔑 Session established");
        Ok(Session::new(token))
    }

    /// One analyze call. A refine is the same call with the same image and new context.
    pub async fn analyze(
        &self,
        session: &Session,
        image: &CompressedImage,
        context: Option<&str>,
    ) -> Result<AnalyzeResponse> {
        let request = AnalyzeRequest {
            image: image.base64.clone(),
            mime_type: image.mime_type,
            context: context.map(str::to_string),
        };

        log::info!("📤 Uploading {} bytes for analysis", image.compressed_size);

        let response = self
            .client
            .post(format!("{}/analyze", self.base_url))
            .header(COOKIE, session.cookie_header())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let envelope: AnalyzeResponse = response.json().await?;
        log::debug!("📥 Analyze response status: {}", status);

        Ok(envelope)
    }

    /// Sign in, analyze, then run each refinement in order on the same image
    /// and sign out. `report` sees every result as it arrives, together with
    /// the refinement text that produced it.
    pub async fn analyze_and_refine<F>(
        &self,
        code: &str,
        image: &CompressedImage,
        context: Option<&str>,
        refinements: &[String],
        mut report: F,
    ) -> Result<Vec<AnalyzeResponse>>
    where
        F: FnMut(Option<&str>, &AnalyzeResponse),
    {
        let session = self.login(code).await?;

        let first = self.analyze(&session, image, context).await?;
        report(None, &first);
        let mut responses = vec![first];

        // Each refinement waits for the previous one; results are independent
        for extra in refinements {
            let response = self.analyze(&session, image, Some(extra)).await?;
            report(Some(extra), &response);
            responses.push(response);
        }

        if let Err(e) = self.logout(&session).await {
            log::warn!("⚠️ Logout failed: {}", e);
        }

        Ok(responses)
    }

    pub async fn logout(&self, session: &Session) -> Result<()> {
        self.client
            .delete(format!("{}/auth", self.base_url))
            .header(COOKIE, session.cookie_header())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

fn session_token_from_set_cookie(header: &str) -> Option<String> {
    let pair = header.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
}
