//! Lightbox - edit, publish and render photo journal posts stored as JSON.
//!
//! # Usage
//!
//! ```bash
//! lightbox normalize draft.html
//! lightbox embed post.json beach.png --width 50% --wrap left
//! lightbox save post.json --publish
//! lightbox feed posts/*.json
//! lightbox list posts/*.json
//! lightbox delete 42 posts/*.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use time::OffsetDateTime;
use tracing::info;

use lightbox::config::{
    Overrides, Settings, global_config_path, load_settings, local_override_path,
};
use lightbox_core::{
    AppContext, EditingSession, EditorState, ImageFile, ImageInsertion, ImageRequest, ImageWidth,
    ImageWrap, MetadataVisibility, PostRecord, admin_listing, build_feed, delete_post,
    format_post_date, render_feed, render_post, render_preview,
};

/// Edit, publish and render photo journal posts
#[derive(Parser, Debug)]
#[command(name = "lightbox", version, about, long_about = None)]
struct Cli {
    /// Tracing filter directive; RUST_LOG wins when set
    #[arg(long, global = true, value_name = "FILTER")]
    log_filter: Option<String>,

    /// Signed-in user for editing commands
    #[arg(long, global = true)]
    user: Option<String>,

    /// Settings file to use instead of the global one
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Print the normalized form of an HTML body
    Normalize {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Render a post page
    Render {
        #[arg(value_name = "POST")]
        post: PathBuf,
        /// Expand the technical details of this gallery image (repeatable)
        #[arg(long = "details", value_name = "INDEX")]
        details: Vec<usize>,
        /// Render drafts too (requires a signed-in user)
        #[arg(long)]
        preview: bool,
    },
    /// Insert an image at the start of a post body
    Embed {
        #[arg(value_name = "POST")]
        post: PathBuf,
        /// Image file, or a URL with --url
        #[arg(value_name = "IMAGE")]
        image: String,
        #[arg(long)]
        url: bool,
        #[arg(long)]
        width: Option<ImageWidth>,
        #[arg(long)]
        wrap: Option<ImageWrap>,
        #[arg(long)]
        alt: Option<String>,
        #[arg(long)]
        caption: Option<String>,
    },
    /// Validate and save a post, optionally publishing it
    Save {
        #[arg(value_name = "POST")]
        post: PathBuf,
        #[arg(long)]
        publish: bool,
    },
    /// Flip a post between published and draft
    Toggle {
        #[arg(value_name = "POST")]
        post: PathBuf,
    },
    /// Render the blog list from post files
    Feed {
        #[arg(value_name = "POST", required = true)]
        posts: Vec<PathBuf>,
        /// Print entries as JSON instead of markup
        #[arg(long)]
        json: bool,
    },
    /// List every post, drafts included, newest first
    List {
        #[arg(value_name = "POST", required = true)]
        posts: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Delete the post with the given id from a set of post files
    Delete {
        #[arg(value_name = "ID")]
        id: String,
        #[arg(value_name = "POST", required = true)]
        posts: Vec<PathBuf>,
    },
}

fn init_tracing(filter: Option<&str>) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter.unwrap_or("warn")));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_post(path: &Path) -> Result<PostRecord> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read post {}", path.display()))?;
    PostRecord::from_json(&content).with_context(|| format!("Invalid post {}", path.display()))
}

fn read_posts(paths: &[PathBuf]) -> Result<Vec<PostRecord>> {
    paths.iter().map(|path| read_post(path)).collect()
}

fn write_post(path: &Path, post: &PostRecord) -> Result<()> {
    let json = post.to_json()?;
    fs::write(path, format!("{json}\n"))
        .with_context(|| format!("Failed to write post {}", path.display()))
}

fn app_context(settings: &Settings) -> AppContext {
    let mut ctx = AppContext::new();
    if let Some(user) = &settings.session.user {
        ctx.sign_in(user.clone());
    }
    ctx.set_dark_mode(settings.session.dark_mode);
    ctx
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = match &cli.config {
        Some(path) => vec![path.clone()],
        None => vec![global_config_path(), local_override_path()],
    };
    let mut overrides = Overrides {
        log_filter: cli.log_filter.clone(),
        user: cli.user.clone(),
        ..Overrides::default()
    };
    if let Action::Embed { width, wrap, .. } = &cli.command {
        overrides.width = *width;
        overrides.wrap = *wrap;
    }
    let settings = load_settings(&paths)?.apply(&overrides);
    init_tracing(settings.log_filter.as_deref());

    let ctx = app_context(&settings);
    let result = run(cli.command, &settings, &ctx).await;
    ctx.teardown();
    result
}

async fn run(action: Action, settings: &Settings, ctx: &AppContext) -> Result<()> {
    match action {
        Action::Normalize { file } => {
            let input = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let state = EditorState::from_html(&input, settings.editor_config())
                .with_context(|| format!("Failed to normalize {}", file.display()))?;
            println!("{}", state.to_html());
        }
        Action::Render {
            post,
            details,
            preview,
        } => {
            let record = read_post(&post)?;
            let mut visibility = MetadataVisibility::new();
            for index in details {
                visibility.toggle(index);
            }
            let html = if preview {
                ctx.authorize("preview")?;
                render_preview(&record, &visibility)?
            } else {
                render_post(&record, &visibility)?
            };
            let theme = if ctx.dark_mode() { "dark" } else { "light" };
            println!("<main data-theme=\"{theme}\">{html}</main>");
        }
        Action::Embed {
            post,
            image,
            url,
            alt,
            caption,
            ..
        } => {
            let record = read_post(&post)?;
            let publish = record.published;
            let mut session = EditingSession::start(ctx, record, settings.editor_config())?;

            let request = if url {
                ImageRequest::url(image)
            } else {
                let path = PathBuf::from(&image);
                let file = ImageFile::open(&path)
                    .await
                    .with_context(|| format!("Failed to read image {}", path.display()))?;
                ImageRequest::file(file)
            };
            let mut request = request.layout(settings.image_layout());
            if let Some(alt) = alt {
                request = request.alt(alt);
            }
            if let Some(caption) = caption {
                request = request.caption(caption);
            }

            if session.insert_image(request)? == ImageInsertion::Pending {
                match session.finish_upload().await {
                    Some(result) => result?,
                    None => bail!("image upload vanished before completing"),
                }
            }

            let saved = session.finish(publish, OffsetDateTime::now_utc())?;
            write_post(&post, saved)?;
            info!(post = %post.display(), "image embedded");
        }
        Action::Save { post, publish } => {
            let record = read_post(&post)?;
            let mut session = EditingSession::start(ctx, record, settings.editor_config())?;
            let saved = session.finish(publish, OffsetDateTime::now_utc())?;
            write_post(&post, saved)?;
        }
        Action::Toggle { post } => {
            ctx.authorize("toggle publication")?;
            let mut record = read_post(&post)?;
            record.toggle_publish(OffsetDateTime::now_utc());
            write_post(&post, &record)?;
            println!("{}", if record.published { "published" } else { "draft" });
        }
        Action::Feed { posts, json } => {
            let records = read_posts(&posts)?;
            let entries = build_feed(&records)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("{}", render_feed(&entries)?);
            }
        }
        Action::List { posts, json } => {
            ctx.authorize("list posts")?;
            let rows = admin_listing(&read_posts(&posts)?);
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }
            for row in rows {
                let created = match row.created_at {
                    Some(at) => format_post_date(at)?,
                    None => "-".to_string(),
                };
                println!("{:<9} {:<8} {}\t{}", row.status, created, row.id, row.title);
            }
        }
        Action::Delete { id, posts } => {
            ctx.authorize("delete")?;
            let mut records = read_posts(&posts)?;
            let (index, removed) = delete_post(&mut records, &id)?;
            let path = &posts[index];
            fs::remove_file(path)
                .with_context(|| format!("Failed to delete post {}", path.display()))?;
            info!(post = %removed.id, path = %path.display(), "post file removed");
            println!("deleted {}", removed.id);
        }
    }
    Ok(())
}
