use indexmap::IndexMap;

/// Structured scenario text generation.
pub const CAPABILITY_TEXT: &str = "text";
/// Image from a text prompt.
pub const CAPABILITY_IMAGE: &str = "image";
/// Image from a reference image plus an instruction.
pub const CAPABILITY_EDIT: &str = "edit";

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

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: &str) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, provider: &str, capabilities: &[&str]| {
        map.insert(
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

    insert("dryrun-text-1", "dryrun", &[CAPABILITY_TEXT]);
    insert(
        "dryrun-image-1",
        "dryrun",
        &[CAPABILITY_IMAGE, CAPABILITY_EDIT],
    );
    insert("gemini-2.5-flash", "gemini", &[CAPABILITY_TEXT]);
    insert(
        "gemini-2.5-flash-image",
        "gemini",
        &[CAPABILITY_IMAGE, CAPABILITY_EDIT],
    );

    map
}
