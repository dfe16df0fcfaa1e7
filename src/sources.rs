//! Source management: add, remove and list the configured source roots.
//!
//! Edits go through the settings file. Removing a source also deletes its
//! rows from the store (chunks included) so no stale content stays
//! searchable.

use crate::config::{self, Project, SourceConfig};
use crate::error::{ContextError, Result};
use crate::store::IndexStore;

/// Add a source to the project config and save it.
pub fn add_source(project: &mut Project, source: SourceConfig) -> Result<()> {
    if project.config.source(&source.id).is_some() {
        return Err(ContextError::InvalidSource {
            id: source.id,
            reason: "a source with this id is already configured".to_string(),
        });
    }

    let mut next = project.config.clone();
    next.sources.push(source.clone());
    config::validate(&next).map_err(|e| ContextError::InvalidSource {
        id: source.id.clone(),
        reason: format!("{:#}", e),
    })?;

    project.config = next;
    project.save()?;
    log::info!("added source '{}' at {}", source.id, source.path.display());
    Ok(())
}

/// Remove a source from the store (when one exists) and from the config.
///
/// Returns whether the store held rows for it.
pub async fn remove_source(
    project: &mut Project,
    store: Option<&IndexStore>,
    id: &str,
) -> Result<bool> {
    if project.config.source(id).is_none() {
        return Err(ContextError::UnknownSource(id.to_string()));
    }

    let had_rows = match store {
        Some(store) => store.delete_source(id).await?,
        None => false,
    };

    project.config.sources.retain(|s| s.id != id);
    project.save()?;
    log::info!("removed source '{}'", id);
    Ok(had_rows)
}

pub fn render_list(project: &Project) -> String {
    if project.config.sources.is_empty() {
        return "No sources configured. Add one with `ctx source add <id> <path>`.\n".to_string();
    }

    let mut out = format!("{:<16} {:<24} {:<30} EXCLUDE\n", "SOURCE", "PATH", "INCLUDE");
    for source in &project.config.sources {
        let exclude = if source.exclude.is_empty() {
            "-".to_string()
        } else {
            source.exclude.join(", ")
        };
        out.push_str(&format!(
            "{:<16} {:<24} {:<30} {}\n",
            source.id,
            source.path.display(),
            source.include.join(", "),
            exclude
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config, Config};
    use crate::store::SourceStats;
    use tempfile::TempDir;

    fn project(tmp: &TempDir) -> Project {
        let project = Project::new(tmp.path(), Config::default());
        project.save().unwrap();
        project
    }

    #[test]
    fn test_add_persists_and_rejects_duplicates() {
        let tmp = TempDir::new().unwrap();
        let mut project = project(&tmp);
        add_source(&mut project, SourceConfig::new("src", "src")).unwrap();

        let saved = load_config(&project.config_path()).unwrap();
        assert_eq!(saved.sources.len(), 1);

        let err = add_source(&mut project, SourceConfig::new("src", "other")).unwrap_err();
        assert!(matches!(err, ContextError::InvalidSource { .. }));
        assert_eq!(project.config.sources.len(), 1);
    }

    #[test]
    fn test_add_rejects_bad_pattern() {
        let tmp = TempDir::new().unwrap();
        let mut project = project(&tmp);
        let mut source = SourceConfig::new("src", "src");
        source.include = vec!["src/[".to_string()];
        assert!(add_source(&mut project, source).is_err());
        assert!(project.config.sources.is_empty());
    }

    #[tokio::test]
    async fn test_remove_deletes_rows_and_config() {
        let tmp = TempDir::new().unwrap();
        let mut project = project(&tmp);
        add_source(&mut project, SourceConfig::new("src", "src")).unwrap();
        let store = IndexStore::initialize(&project.store_path()).await.unwrap();
        store
            .upsert_source(&SourceConfig::new("src", "src"), SourceStats::default())
            .await
            .unwrap();

        assert!(remove_source(&mut project, Some(&store), "src").await.unwrap());
        assert!(store.source_ids().await.unwrap().is_empty());
        assert!(load_config(&project.config_path()).unwrap().sources.is_empty());

        let err = remove_source(&mut project, Some(&store), "src").await.unwrap_err();
        assert!(matches!(err, ContextError::UnknownSource(_)));
    }

    #[test]
    fn test_render_list() {
        let tmp = TempDir::new().unwrap();
        let mut project = project(&tmp);
        assert!(render_list(&project).contains("No sources"));
        add_source(&mut project, SourceConfig::new("docs", "docs")).unwrap();
        assert!(render_list(&project).contains("docs"));
    }
}
