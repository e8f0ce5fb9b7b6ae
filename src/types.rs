use serde::{Deserialize, Serialize};

/// Icon and "open with" link attached to a file entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppBinding {
    pub icon: String,
    pub application_link: String,
}

/// One entry of a directory listing. Built fresh per walk, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub size_si: String,
    pub is_dir: bool,
    pub child_count: u64,
    pub extension: String,
    pub content_hash: String,
    pub modified: Option<i64>,
    pub app_binding: Option<AppBinding>,
}

/// A per-user file type setting, one per (username, extension).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTypeSetting {
    pub username: String,
    pub extension: String,
    pub icon: String,
    pub application_link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilesQuery {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesResponse {
    pub volume: String,
    pub path: String,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub entries: Vec<FileEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingRequest {
    pub extension: String,
    pub application_link: String,
    #[serde(default)]
    pub icon: Option<String>,
}
