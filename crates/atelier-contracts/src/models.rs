use indexmap::IndexMap;

use crate::error::EditError;

pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

/// The models an edit can be routed to. `image` models carry the five editing
/// operations, `text` models carry prompt rewrites; the dryrun pair keeps the
/// whole pipeline runnable offline.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelCatalog {
    pub fn builtin() -> Self {
        let mut models = IndexMap::new();
        let mut insert = |name: &str, provider: &str, capabilities: &[&str]| {
            models.insert(
                name.to_string(),
                ModelSpec {
                    name: name.to_string(),
                    provider: provider.to_string(),
                    capabilities: capabilities
                        .iter()
                        .map(|item| (*item).to_string())
                        .collect(),
                },
            );
        };

        insert(DEFAULT_IMAGE_MODEL, "gemini", &["image"]);
        insert("gemini-3-pro-image-preview", "gemini", &["image"]);
        insert(DEFAULT_TEXT_MODEL, "gemini", &["text"]);
        insert("dryrun-image-1", "dryrun", &["image"]);
        insert("dryrun-text-1", "dryrun", &["text"]);

        Self { models }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn names_with(&self, capability: &str) -> Vec<String> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .map(|model| model.name.clone())
            .collect()
    }

    /// Look a model up and check it carries the capability, or explain what
    /// would have worked.
    pub fn ensure(&self, name: &str, capability: &str) -> Result<ModelSpec, EditError> {
        match self.get(name) {
            Some(model) if model.supports(capability) => Ok(model.clone()),
            Some(_) => Err(EditError::Validation(format!(
                "model '{name}' does not support '{capability}'; available: {}",
                self.names_with(capability).join(", ")
            ))),
            None => Err(EditError::Validation(format!(
                "unknown model '{name}'; available for '{capability}': {}",
                self.names_with(capability).join(", ")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_has_the_default_models() {
        let catalog = ModelCatalog::builtin();
        let image = catalog.ensure(DEFAULT_IMAGE_MODEL, "image").unwrap();
        assert_eq!(image.provider, "gemini");
        let text = catalog.ensure(DEFAULT_TEXT_MODEL, "text").unwrap();
        assert_eq!(text.provider, "gemini");
        assert_eq!(catalog.ensure("dryrun-image-1", "image").unwrap().provider, "dryrun");
    }

    #[test]
    fn ensure_rejects_unknown_models_and_wrong_capabilities() {
        let catalog = ModelCatalog::builtin();
        let err = catalog.ensure("sdxl", "image").unwrap_err();
        assert!(err.message().contains("unknown model 'sdxl'"));
        assert!(err.message().contains(DEFAULT_IMAGE_MODEL));

        let err = catalog.ensure(DEFAULT_TEXT_MODEL, "image").unwrap_err();
        assert!(err.message().contains("does not support 'image'"));
    }

    #[test]
    fn names_with_preserves_catalog_order() {
        let catalog = ModelCatalog::builtin();
        assert_eq!(
            catalog.names_with("image"),
            vec![
                DEFAULT_IMAGE_MODEL.to_string(),
                "gemini-3-pro-image-preview".to_string(),
                "dryrun-image-1".to_string(),
            ]
        );
    }
}
