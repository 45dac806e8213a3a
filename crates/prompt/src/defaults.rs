//! Built-in prompt definitions.

use crate::types::PromptDefinition;

/// Identifier of the grounded-answer prompt used by the engine.
pub const ANSWER_PROMPT_ID: &str = "engine.answer.default";

const ANSWER_SYSTEM: &str = "You are an expert in {{domain}}. \
Answer ONLY using the provided context. \
If the context does not contain the answer, say that the documents do not cover it. \
Cite sources using [Source: name] format, with the name exactly as given in the context.";

const ANSWER_TEMPLATE: &str = "Context:\n{{context}}\n\nQuestion: {{query}}";

/// Look up a built-in prompt by id.
pub fn builtin_prompt(id: &str) -> Option<PromptDefinition> {
    match id {
        ANSWER_PROMPT_ID => Some(PromptDefinition {
            id: ANSWER_PROMPT_ID.to_string(),
            title: "Grounded answer with citations".to_string(),
            api_version: "1.0".to_string(),
            system: Some(ANSWER_SYSTEM.to_string()),
            template: ANSWER_TEMPLATE.to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_prompt_requires_citations() {
        let def = builtin_prompt(ANSWER_PROMPT_ID).unwrap();
        let system = def.system.unwrap();
        assert!(system.contains("ONLY using the provided context"));
        assert!(system.contains("[Source: name]"));
        assert_eq!(def.template, "Context:\n{{context}}\n\nQuestion: {{query}}");
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(builtin_prompt("nope").is_none());
    }
}
