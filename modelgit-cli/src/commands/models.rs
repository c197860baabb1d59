use super::Workspace;
use anyhow::{Context, Result};
use colored::Colorize;
use modelgit_core::{ModelEntity, ModelType};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Reads one entity or an array of entities.
pub fn read_entities(file: &Path) -> Result<Vec<ModelEntity>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Cannot read {}", file.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    let entities = match value {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<serde_json::Result<Vec<ModelEntity>>>()?,
        single => vec![serde_json::from_value(single)?],
    };
    Ok(entities
        .into_iter()
        .map(|e| {
            let category = e.category.clone();
            e.with_category(category)
        })
        .collect())
}

pub fn put(workspace: Option<PathBuf>, file: PathBuf) -> Result<()> {
    let workspace = Workspace::open(workspace)?;
    let entities = read_entities(&file)?;
    let db = workspace.db()?;

    for entity in &entities {
        db.save(entity)?;
        println!(
            "  {} {} {}",
            "✓".green(),
            entity.model_type.to_string().dimmed(),
            entity.path()
        );
    }
    println!("{} model(s) saved", entities.len().to_string().cyan());
    Ok(())
}

pub fn remove(workspace: Option<PathBuf>, model_type: ModelType, ref_id: String) -> Result<()> {
    let workspace = Workspace::open(workspace)?;
    let entity = workspace.db()?.delete(model_type, &ref_id)?;
    println!(
        "  {} {} {}",
        "-".red(),
        entity.model_type.to_string().dimmed(),
        entity.path()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_single_and_array() {
        let dir = TempDir::new().unwrap();
        let single = dir.path().join("single.json");
        std::fs::write(
            &single,
            r#"{"refId": "a", "modelType": "FLOW", "name": "Steel", "category": "/metals/"}"#,
        )
        .unwrap();
        let entities = read_entities(&single).unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].path(), "metals/Steel");

        let array = dir.path().join("array.json");
        std::fs::write(
            &array,
            r#"[{"refId": "a", "modelType": "FLOW", "name": "A"},
                {"refId": "b", "modelType": "PROCESS", "name": "B"}]"#,
        )
        .unwrap();
        let entities = read_entities(&array).unwrap();
        assert_eq!(entities[1].model_type, ModelType::Process);
    }

    #[test]
    fn test_read_rejects_invalid_json() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("bad.json");
        std::fs::write(&file, "{").unwrap();
        assert!(read_entities(&file).is_err());
    }
}
