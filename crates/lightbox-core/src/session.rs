use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::commands::{Command, CommandError};
use crate::core::{ApplyError, ImageNode};
use crate::editor::{EditorConfig, EditorState};
use crate::image::{ImageRequest, Resolution, UploadSlot};
use crate::post::{PostError, PostRecord};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("this action requires a signed-in user")]
    Unauthorized,
    #[error(transparent)]
    Post(#[from] PostError),
    #[error("stored content could not be loaded: {0}")]
    Content(#[from] ApplyError),
}

/// Process-wide state shared by every editing session: who is signed in,
/// whether they may edit, and the display theme.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppContext {
    user: Option<String>,
    authorized: bool,
    dark_mode: bool,
}

impl AppContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&mut self, user: impl Into<String>) {
        let user = user.into();
        info!(%user, "signed in");
        self.user = Some(user);
        self.authorized = true;
    }

    pub fn sign_out(&mut self) {
        if let Some(user) = self.user.take() {
            info!(%user, "signed out");
        }
        self.authorized = false;
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized
    }

    /// Admin actions (editing, publishing, deleting, listing drafts) need a
    /// signed-in user.
    pub fn authorize(&self, action: &'static str) -> Result<(), SessionError> {
        if self.authorized {
            return Ok(());
        }
        warn!(action, "refused: not authorized");
        Err(SessionError::Unauthorized)
    }

    pub fn dark_mode(&self) -> bool {
        self.dark_mode
    }

    pub fn set_dark_mode(&mut self, dark_mode: bool) {
        self.dark_mode = dark_mode;
    }

    pub fn toggle_dark_mode(&mut self) -> bool {
        self.dark_mode = !self.dark_mode;
        self.dark_mode
    }

    pub fn teardown(mut self) {
        self.sign_out();
        debug!("application context torn down");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageInsertion {
    Inserted,
    Pending,
}

/// One post open in the editor.
#[derive(Debug)]
pub struct EditingSession {
    post: PostRecord,
    editor: EditorState,
    uploads: UploadSlot,
}

impl EditingSession {
    pub fn start(
        ctx: &AppContext,
        post: PostRecord,
        config: EditorConfig,
    ) -> Result<Self, SessionError> {
        ctx.authorize("edit")?;
        let editor = EditorState::from_html(&post.content, config)?;
        debug!(
            post = %post.id,
            user = ctx.user().unwrap_or("unknown"),
            "editing session started"
        );
        Ok(Self {
            post,
            editor,
            uploads: UploadSlot::default(),
        })
    }

    pub fn editor(&self) -> &EditorState {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut EditorState {
        &mut self.editor
    }

    pub fn post(&self) -> &PostRecord {
        &self.post
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.post.title = title.into();
    }

    pub fn set_excerpt(&mut self, excerpt: Option<String>) {
        self.post.excerpt = excerpt;
    }

    pub fn apply(&mut self, command: Command) -> Result<(), CommandError> {
        self.editor.apply(command)
    }

    pub fn is_uploading(&self) -> bool {
        self.uploads.is_busy()
    }

    /// URLs are inserted at once; files are encoded in the background and
    /// inserted by [`poll_upload`](Self::poll_upload) or
    /// [`finish_upload`](Self::finish_upload).
    pub fn insert_image(
        &mut self,
        request: ImageRequest,
    ) -> Result<ImageInsertion, CommandError> {
        match self.uploads.begin(request)? {
            Resolution::Ready(node) => {
                self.insert_node(node)?;
                Ok(ImageInsertion::Inserted)
            }
            Resolution::Pending => Ok(ImageInsertion::Pending),
        }
    }

    pub fn poll_upload(&mut self) -> Option<Result<(), CommandError>> {
        let result = self.uploads.try_complete()?;
        Some(result.and_then(|node| self.insert_node(node)))
    }

    pub async fn finish_upload(&mut self) -> Option<Result<(), CommandError>> {
        let result = self.uploads.wait().await?;
        Some(result.and_then(|node| self.insert_node(node)))
    }

    pub fn cancel_upload(&mut self) {
        self.uploads.abandon();
    }

    fn insert_node(&mut self, node: ImageNode) -> Result<(), CommandError> {
        if let Err(err) = self.editor.apply(Command::InsertImage(node)) {
            warn!(%err, "image insertion failed");
            return Err(err);
        }
        Ok(())
    }

    /// Writes the document back into the post and applies the save rules.
    pub fn finish(
        &mut self,
        publish: bool,
        now: OffsetDateTime,
    ) -> Result<&PostRecord, SessionError> {
        if self.uploads.is_busy() {
            warn!(post = %self.post.id, "saving while an image upload is still pending");
        }
        let mut post = self.post.clone();
        post.content = self.editor.to_html();
        post.save(publish, now)?;
        self.post = post;
        Ok(&self.post)
    }

    pub fn into_post(self) -> PostRecord {
        self.post
    }
}
