//! Per-user "open with" settings and their merge into directory listings.

use std::collections::HashMap;

use crate::db::{file_settings_schema, Database, FILE_SETTINGS_TABLE};
use crate::error::AppResult;
use crate::query::{Operation, QuerySpec, Row};
use crate::schema::SchemaRegistry;
use crate::types::{AppBinding, FileEntry, FileTypeSetting};

/// Attaches an [`AppBinding`] to every entry that has an extension. Entries
/// without a matching setting get an empty binding; directories keep `None`.
pub fn annotate(entries: Vec<FileEntry>, by_extension: &HashMap<String, FileTypeSetting>) -> Vec<FileEntry> {
    entries
        .into_iter()
        .map(|mut entry| {
            if entry.extension.is_empty() {
                return entry;
            }
            let binding = match by_extension.get(&entry.extension) {
                Some(setting) => AppBinding {
                    icon: if setting.icon.is_empty() {
                        entry.extension.trim_start_matches('.').to_string()
                    } else {
                        setting.icon.clone()
                    },
                    application_link: setting.application_link.clone(),
                },
                None => AppBinding::default(),
            };
            entry.app_binding = Some(binding);
            entry
        })
        .collect()
}

/// Indexes settings by lowercase extension.
pub fn by_extension(settings: Vec<FileTypeSetting>) -> HashMap<String, FileTypeSetting> {
    settings.into_iter().map(|s| (s.extension.to_ascii_lowercase(), s)).collect()
}

fn text(row: &Row, column: &str) -> String {
    row.get(column).and_then(|v| v.as_text()).unwrap_or_default().to_string()
}

pub async fn settings_for_user(
    db: &Database,
    registry: &SchemaRegistry,
    username: &str,
) -> AppResult<Vec<FileTypeSetting>> {
    let mut spec = QuerySpec::new(Operation::Select, FILE_SETTINGS_TABLE)
        .with_schema(&file_settings_schema())
        .filter("Username", username);
    spec.execute(db, registry).await?;
    Ok(spec
        .result_rows
        .iter()
        .map(|row| FileTypeSetting {
            username: text(row, "Username"),
            extension: text(row, "Extension"),
            icon: text(row, "Icon"),
            application_link: text(row, "ApplicationLink"),
        })
        .collect())
}

/// Updates the (username, extension) row, inserting it when absent.
pub async fn upsert_setting(db: &Database, registry: &SchemaRegistry, setting: &FileTypeSetting) -> AppResult<u64> {
    let spec = QuerySpec::new(Operation::Update, FILE_SETTINGS_TABLE)
        .with_schema(&file_settings_schema())
        .filter("Username", setting.username.as_str())
        .filter("Extension", setting.extension.to_ascii_lowercase())
        .set("Icon", setting.icon.as_str())
        .set("ApplicationLink", setting.application_link.as_str());
    spec.upsert(db, registry).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, ext: &str) -> FileEntry {
        FileEntry {
            name: name.into(),
            path: format!("/{}{}", name, ext),
            size: 0,
            size_si: "0 B".into(),
            is_dir: false,
            child_count: 0,
            extension: ext.into(),
            content_hash: String::new(),
            modified: None,
            app_binding: None,
        }
    }

    fn dir(name: &str) -> FileEntry {
        FileEntry { is_dir: true, ..file(name, "") }
    }

    fn setting(ext: &str, icon: &str, link: &str) -> FileTypeSetting {
        FileTypeSetting {
            username: "alice".into(),
            extension: ext.into(),
            icon: icon.into(),
            application_link: link.into(),
        }
    }

    #[test]
    fn annotate_binds_matching_settings() {
        let map = by_extension(vec![setting(".pdf", "pdf-icon", "/viewer"), setting(".txt", "", "/edit")]);
        let out = annotate(vec![file("a", ".pdf"), file("b", ".txt"), file("c", ".zip"), dir("docs")], &map);

        assert_eq!(
            out[0].app_binding,
            Some(AppBinding { icon: "pdf-icon".into(), application_link: "/viewer".into() })
        );
        assert_eq!(out[1].app_binding, Some(AppBinding { icon: "txt".into(), application_link: "/edit".into() }));
        assert_eq!(out[2].app_binding, Some(AppBinding::default()));
        assert_eq!(out[3].app_binding, None);
    }

    #[test]
    fn files_without_extension_stay_unbound() {
        let out = annotate(vec![file("README", "")], &HashMap::new());
        assert_eq!(out[0].app_binding, None);
    }

    #[test]
    fn by_extension_keys_are_lowercase() {
        let map = by_extension(vec![setting(".PDF", "", "/viewer")]);
        assert!(map.contains_key(".pdf"));
    }
}
