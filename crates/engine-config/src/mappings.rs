use crate::error::ConfigError;
use crate::paths::BridgePaths;
use model::mapping::Mapping;
use tracing::debug;

/// Loads and validates every mapping definition under `config/mappings/`.
///
/// Validation happens here, before any task starts: a malformed mapping file
/// is a configuration error for the whole invocation, not a per-mapping
/// runtime failure. Unknown JSON fields are ignored.
pub fn load_all(paths: &BridgePaths) -> Result<Vec<Mapping>, ConfigError> {
    let dir = paths.mappings_dir();
    let entries = std::fs::read_dir(&dir).map_err(|err| ConfigError::io(dir.display(), err))?;

    let mut mappings = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| ConfigError::io(dir.display(), err))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let raw = std::fs::read_to_string(&path)
            .map_err(|err| ConfigError::io(path.display(), err))?;
        let mut mapping: Mapping = serde_json::from_str(&raw)
            .map_err(|err| ConfigError::parse(path.display(), err))?;

        if mapping.id.is_empty() {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                mapping.id = stem.to_string();
            }
        }
        mapping.validate()?;

        debug!(mapping = %mapping.id, source = mapping.source.kind(), "loaded mapping");
        mappings.push(mapping);
    }

    mappings.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(mappings)
}

/// Narrows the loaded set to an explicit selection, erroring on ids that
/// match nothing.
pub fn select(
    mappings: Vec<Mapping>,
    only: &[String],
) -> Result<Vec<Mapping>, ConfigError> {
    if only.is_empty() {
        return Ok(mappings);
    }
    for wanted in only {
        if !mappings.iter().any(|m| &m.id == wanted) {
            return Err(ConfigError::UnknownMapping(wanted.clone()));
        }
    }
    Ok(mappings
        .into_iter()
        .filter(|m| only.iter().any(|w| w == &m.id))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_mapping(dir: &std::path::Path, name: &str, body: &str) {
        std::fs::write(dir.join(format!("{name}.json")), body).unwrap();
    }

    fn setup() -> (tempfile::TempDir, BridgePaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = BridgePaths::new(dir.path());
        paths.ensure_directories().unwrap();
        (dir, paths)
    }

    const VALID: &str = r#"{
        "id": "users",
        "schema_slug": "users-v1",
        "source": {"type": "mysql", "host": "h", "database": "d", "user": "u", "secret_ref": "s"},
        "table": "users"
    }"#;

    #[test]
    fn loads_and_sorts_mappings() {
        let (_dir, paths) = setup();
        write_mapping(&paths.mappings_dir(), "zz", &VALID.replace("users", "zz"));
        write_mapping(&paths.mappings_dir(), "users", VALID);
        std::fs::write(paths.mappings_dir().join("notes.txt"), "ignored").unwrap();

        let mappings = load_all(&paths).unwrap();
        let ids: Vec<_> = mappings.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["users", "zz"]);
    }

    #[test]
    fn id_defaults_to_the_file_stem() {
        let (_dir, paths) = setup();
        write_mapping(
            &paths.mappings_dir(),
            "orders",
            &VALID.replace("\"id\": \"users\",", "\"id\": \"\","),
        );

        let mappings = load_all(&paths).unwrap();
        assert_eq!(mappings[0].id, "orders");
    }

    #[test]
    fn invalid_mapping_fails_the_load() {
        let (_dir, paths) = setup();
        write_mapping(
            &paths.mappings_dir(),
            "broken",
            &VALID.replace("\"table\": \"users\"", "\"table\": null"),
        );

        assert!(matches!(load_all(&paths), Err(ConfigError::Mapping(_))));
    }

    #[test]
    fn missing_required_field_is_a_parse_error() {
        let (_dir, paths) = setup();
        write_mapping(&paths.mappings_dir(), "broken", r#"{"id": "x"}"#);
        assert!(matches!(load_all(&paths), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn selection_rejects_unknown_ids() {
        let (_dir, paths) = setup();
        write_mapping(&paths.mappings_dir(), "users", VALID);
        let mappings = load_all(&paths).unwrap();

        let err = select(mappings, &["ghost".to_string()]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownMapping(_)));
    }
}
