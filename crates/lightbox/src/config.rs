use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lightbox_core::{EditorConfig, ImageLayout, ImageWidth, ImageWrap};
use serde::Deserialize;

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    pub default_width: ImageWidth,
    pub default_wrap: ImageWrap,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub user: Option<String>,
    pub dark_mode: bool,
}

/// Effective settings after merging the global file, the local override and
/// command-line flags.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_filter: Option<String>,
    pub editor: EditorConfig,
    pub images: ImageSettings,
    pub session: SessionSettings,
}

/// Flags given on the command line. Anything set here beats the files.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Overrides {
    pub log_filter: Option<String>,
    pub user: Option<String>,
    pub width: Option<ImageWidth>,
    pub wrap: Option<ImageWrap>,
}

impl Settings {
    pub fn apply(mut self, overrides: &Overrides) -> Self {
        if let Some(filter) = &overrides.log_filter {
            self.log_filter = Some(filter.clone());
        }
        if let Some(user) = &overrides.user {
            self.session.user = Some(user.clone());
        }
        if let Some(width) = overrides.width {
            self.images.default_width = width;
        }
        if let Some(wrap) = overrides.wrap {
            self.images.default_wrap = wrap;
        }
        self
    }

    pub fn editor_config(&self) -> EditorConfig {
        self.editor.with_defaults()
    }

    pub fn image_layout(&self) -> ImageLayout {
        ImageLayout::new(self.images.default_width, self.images.default_wrap)
    }
}

pub fn global_config_path() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("lightbox").join("config.toml");
    }
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("lightbox")
            .join("config.toml");
    }
    local_override_path()
}

pub fn local_override_path() -> PathBuf {
    PathBuf::from(".lightbox.toml")
}

/// Reads one settings file. A missing file is an empty table.
pub fn load_table(path: &Path) -> Result<toml::Table> {
    if !path.exists() {
        return Ok(toml::Table::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    content
        .parse::<toml::Table>()
        .with_context(|| format!("Failed to parse config {}", path.display()))
}

/// Later paths override earlier ones key by key; nested tables merge.
pub fn load_settings(paths: &[PathBuf]) -> Result<Settings> {
    let mut merged = toml::Table::new();
    for path in paths {
        merge_tables(&mut merged, load_table(path)?);
    }
    toml::Value::Table(merged)
        .try_into()
        .context("Invalid settings")
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
