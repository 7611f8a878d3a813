use std::fmt;
use std::path::Path;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::commands::CommandError;
use crate::core::ImageNode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageWidth {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "25%")]
    Quarter,
    #[serde(rename = "50%")]
    Half,
    #[serde(rename = "75%")]
    ThreeQuarters,
    #[serde(rename = "100%")]
    Full,
    #[serde(rename = "300px")]
    Px300,
    #[serde(rename = "500px")]
    Px500,
}

impl ImageWidth {
    pub const ALL: [ImageWidth; 7] = [
        ImageWidth::Auto,
        ImageWidth::Quarter,
        ImageWidth::Half,
        ImageWidth::ThreeQuarters,
        ImageWidth::Full,
        ImageWidth::Px300,
        ImageWidth::Px500,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ImageWidth::Auto => "auto",
            ImageWidth::Quarter => "25%",
            ImageWidth::Half => "50%",
            ImageWidth::ThreeQuarters => "75%",
            ImageWidth::Full => "100%",
            ImageWidth::Px300 => "300px",
            ImageWidth::Px500 => "500px",
        }
    }
}

impl FromStr for ImageWidth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ImageWidth::ALL
            .into_iter()
            .find(|width| width.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "unknown image width `{s}` \
                     (expected auto, 25%, 50%, 75%, 100%, 300px or 500px)"
                )
            })
    }
}

impl fmt::Display for ImageWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageWrap {
    #[default]
    None,
    Left,
    Right,
}

impl ImageWrap {
    pub const ALL: [ImageWrap; 3] = [ImageWrap::None, ImageWrap::Left, ImageWrap::Right];

    pub fn as_str(self) -> &'static str {
        match self {
            ImageWrap::None => "none",
            ImageWrap::Left => "left",
            ImageWrap::Right => "right",
        }
    }
}

impl FromStr for ImageWrap {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(ImageWrap::None),
            "left" => Ok(ImageWrap::Left),
            "right" => Ok(ImageWrap::Right),
            other => Err(format!("unknown image wrap `{other}` (expected none, left or right)")),
        }
    }
}

impl fmt::Display for ImageWrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageLayout {
    pub width: ImageWidth,
    pub wrap: ImageWrap,
}

impl ImageLayout {
    pub fn new(width: ImageWidth, wrap: ImageWrap) -> Self {
        Self { width, wrap }
    }

    /// The inline CSS stored on the image.
    pub fn style(&self) -> String {
        let width = match self.width {
            ImageWidth::Auto => "max-width:100%".to_string(),
            other => format!("width:{other}"),
        };
        let wrap = match self.wrap {
            ImageWrap::None => "display:block;margin:1rem auto",
            ImageWrap::Left => "float:left;margin:0 1rem 1rem 0",
            ImageWrap::Right => "float:right;margin:0 0 1rem 1rem",
        };
        [width.as_str(), "height:auto", wrap, "border-radius:0.5rem"].join(";")
    }
}

/// A picked local file. `media_type` is what the picker reported, if anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: None,
            bytes,
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, bytes))
    }

    pub fn resolved_media_type(&self) -> Option<String> {
        self.media_type
            .clone()
            .filter(|media_type| !media_type.trim().is_empty())
            .or_else(|| {
                mime_guess::from_path(&self.name)
                    .first()
                    .map(|mime| mime.essence_str().to_string())
            })
    }

    /// The media type, provided it is an `image/*` one.
    pub fn image_media_type(&self) -> Result<String, CommandError> {
        match self.resolved_media_type() {
            Some(media_type) if media_type.to_ascii_lowercase().starts_with("image/") => {
                Ok(media_type.to_ascii_lowercase())
            }
            _ => Err(CommandError::InvalidFileType(self.name.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    File(ImageFile),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub source: ImageSource,
    pub layout: ImageLayout,
    pub alt: Option<String>,
    pub caption: Option<String>,
}

impl ImageRequest {
    pub fn url(url: impl Into<String>) -> Self {
        Self::new(ImageSource::Url(url.into()))
    }

    pub fn file(file: ImageFile) -> Self {
        Self::new(ImageSource::File(file))
    }

    fn new(source: ImageSource) -> Self {
        Self {
            source,
            layout: ImageLayout::default(),
            alt: None,
            caption: None,
        }
    }

    pub fn layout(mut self, layout: ImageLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn alt(mut self, alt: impl Into<String>) -> Self {
        self.alt = Some(alt.into());
        self
    }

    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into()).filter(|c| !c.trim().is_empty());
        self
    }

    fn node(&self, src: String) -> ImageNode {
        ImageNode {
            src,
            alt: self.alt.clone().unwrap_or_default(),
            caption: self.caption.clone(),
            style: self.layout.style(),
        }
    }
}

pub fn encode_data_url(media_type: &str, bytes: &[u8]) -> String {
    format!("data:{media_type};base64,{}", STANDARD.encode(bytes))
}

/// Builds the node for a request whose source needs no encoding.
pub fn resolve_url(request: &ImageRequest) -> Result<ImageNode, CommandError> {
    match &request.source {
        ImageSource::Url(url) if url.trim().is_empty() => Err(CommandError::InvalidCommandArgument(
            "image URL must not be empty".into(),
        )),
        ImageSource::Url(url) => Ok(request.node(url.clone())),
        ImageSource::File(_) => Err(CommandError::InvalidCommandArgument(
            "file images must be encoded first".into(),
        )),
    }
}

/// Encodes a file request on the calling thread.
pub fn resolve_file_blocking(request: &ImageRequest) -> Result<ImageNode, CommandError> {
    let ImageSource::File(file) = &request.source else {
        return resolve_url(request);
    };
    let media_type = file.image_media_type()?;
    Ok(request.node(encode_data_url(&media_type, &file.bytes)))
}

/// Outcome of starting an image insertion.
#[derive(Debug)]
pub enum Resolution {
    Ready(ImageNode),
    Pending,
}

struct PendingUpload {
    name: String,
    rx: oneshot::Receiver<Result<ImageNode, CommandError>>,
}

/// At most one file encode in flight per editing session.
#[derive(Default)]
pub struct UploadSlot {
    pending: Option<PendingUpload>,
}

impl fmt::Debug for UploadSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSlot")
            .field("pending", &self.pending.as_ref().map(|p| p.name.as_str()))
            .finish()
    }
}

impl UploadSlot {
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Validates `request` and either resolves it at once (URLs) or hands the
    /// encode to the blocking pool. Must be called inside a tokio runtime for
    /// file sources.
    pub fn begin(&mut self, request: ImageRequest) -> Result<Resolution, CommandError> {
        if self.is_busy() {
            warn!("image upload rejected: another upload is in progress");
            return Err(CommandError::UploadInProgress);
        }

        let file = match &request.source {
            ImageSource::Url(_) => return resolve_url(&request).map(Resolution::Ready),
            ImageSource::File(file) => file,
        };
        if let Err(err) = file.image_media_type() {
            warn!(file = %file.name, "image upload rejected: not an image");
            return Err(err);
        }

        let handle = tokio::runtime::Handle::try_current()
            .map_err(|err| CommandError::EncodeFailure(err.to_string()))?;

        let name = file.name.clone();
        let size = file.bytes.len();
        let (tx, rx) = oneshot::channel();
        handle.spawn_blocking(move || {
            let result = resolve_file_blocking(&request);
            // The receiver is gone when the upload was abandoned.
            let _ = tx.send(result);
        });

        debug!(file = %name, bytes = size, "image encode started");
        self.pending = Some(PendingUpload { name, rx });
        Ok(Resolution::Pending)
    }

    /// Non-blocking check for a finished encode.
    pub fn try_complete(&mut self) -> Option<Result<ImageNode, CommandError>> {
        let pending = self.pending.as_mut()?;
        let result = match pending.rx.try_recv() {
            Ok(result) => result,
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => Err(CommandError::EncodeFailure(
                "encoder stopped without a result".into(),
            )),
        };
        self.pending = None;
        Some(result)
    }

    pub async fn wait(&mut self) -> Option<Result<ImageNode, CommandError>> {
        let pending = self.pending.take()?;
        let result = pending.rx.await.unwrap_or_else(|_| {
            Err(CommandError::EncodeFailure(
                "encoder stopped without a result".into(),
            ))
        });
        Some(result)
    }

    /// Forgets the in-flight encode. Its result is dropped when it arrives.
    pub fn abandon(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(file = %pending.name, "image encode abandoned");
        }
    }
}
