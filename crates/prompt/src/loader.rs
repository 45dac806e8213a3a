//! Prompt loader for YAML prompt definitions.
//!
//! Workspaces may override built-in prompts with `.lumen/prompts/<id>.yml`.

use crate::defaults::builtin_prompt;
use crate::types::PromptDefinition;
use lumen_core::{AppError, AppResult};
use std::path::Path;

/// Load a prompt definition by ID from the workspace.
///
/// # Example
/// ```no_run
/// use lumen_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "engine.answer.default")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = workspace_path
        .join(".lumen/prompts")
        .join(format!("{}.yml", prompt_id));

    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    if !prompt_file.exists() {
        return Err(AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            prompt_file
        )));
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to parse prompt YAML {:?}: {}",
            prompt_file, e
        ))
    })?;

    validate_prompt(&definition)?;

    tracing::info!("Loaded prompt override: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// Resolve a prompt: workspace override first, then the built-in definition.
pub fn resolve_prompt(workspace_path: Option<&Path>, prompt_id: &str) -> AppResult<PromptDefinition> {
    if let Some(workspace) = workspace_path {
        let override_file = workspace
            .join(".lumen/prompts")
            .join(format!("{}.yml", prompt_id));
        if override_file.exists() {
            return load_prompt(workspace, prompt_id);
        }
    }

    builtin_prompt(prompt_id)
        .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))
}

fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::ANSWER_PROMPT_ID;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_prompt(dir: &Path, id: &str, content: &str) -> PathBuf {
        let prompts_dir = dir.join(".lumen/prompts");
        fs::create_dir_all(&prompts_dir).unwrap();
        let file_path = prompts_dir.join(format!("{}.yml", id));
        fs::write(&file_path, content).unwrap();
        file_path
    }

    #[test]
    fn test_load_valid_prompt() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(
            temp_dir.path(),
            ANSWER_PROMPT_ID,
            "id: engine.answer.default\ntitle: Terse\napiVersion: \"1.0\"\ntemplate: \"Q: {{query}}\"\n",
        );

        let prompt = load_prompt(temp_dir.path(), ANSWER_PROMPT_ID).unwrap();
        assert_eq!(prompt.title, "Terse");
        assert_eq!(prompt.template, "Q: {{query}}");
    }

    #[test]
    fn test_load_nonexistent_prompt() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_prompt(temp_dir.path(), "nonexistent").is_err());
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "invalid", "invalid: yaml: content:");
        assert!(load_prompt(temp_dir.path(), "invalid").is_err());
    }

    #[test]
    fn test_invalid_api_version() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(
            temp_dir.path(),
            "p",
            "id: p\ntitle: P\napiVersion: \"1\"\ntemplate: \"{{query}}\"\n",
        );
        assert!(matches!(
            load_prompt(temp_dir.path(), "p"),
            Err(AppError::Prompt(_))
        ));
    }

    #[test]
    fn test_resolve_prefers_override() {
        let temp_dir = TempDir::new().unwrap();
        let builtin = resolve_prompt(Some(temp_dir.path()), ANSWER_PROMPT_ID).unwrap();
        assert!(builtin.system.is_some());

        write_prompt(
            temp_dir.path(),
            ANSWER_PROMPT_ID,
            "id: engine.answer.default\ntitle: Custom\napiVersion: \"1.0\"\ntemplate: \"{{query}}\"\n",
        );
        let custom = resolve_prompt(Some(temp_dir.path()), ANSWER_PROMPT_ID).unwrap();
        assert_eq!(custom.title, "Custom");
    }

    #[test]
    fn test_resolve_unknown_prompt() {
        assert!(resolve_prompt(None, "does.not.exist").is_err());
    }
}
