use super::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    /// Resolves `requested` for one capability, optionally pinned to a
    /// provider. Falls back to the first registered model that fits and
    /// records why; errors only when nothing fits at all.
    pub fn select(
        &self,
        requested: Option<&str>,
        capability: &str,
        provider: Option<&str>,
    ) -> Result<ModelSelection, String> {
        let from_provider =
            |model: &ModelSpec| provider.map_or(true, |name| model.provider == name);

        let exact = requested.and_then(|name| {
            self.registry
                .ensure(name, capability)
                .filter(|model| from_provider(model))
        });
        if let Some(model) = exact {
            return Ok(ModelSelection {
                model,
                requested: requested.map(str::to_string),
                fallback_reason: None,
            });
        }

        let scope = match provider {
            Some(name) => format!("provider '{name}' and capability '{capability}'"),
            None => format!("capability '{capability}'"),
        };
        let model = self
            .registry
            .by_capability(capability)
            .into_iter()
            .find(|model| from_provider(model))
            .ok_or_else(|| format!("No models available for {scope}."))?;
        let fallback_reason = match requested {
            Some(name) => format!("Requested model '{name}' unavailable for {scope}."),
            None => format!("No model specified; using default for {scope}."),
        };
        Ok(ModelSelection {
            model,
            requested: requested.map(str::to_string),
            fallback_reason: Some(fallback_reason),
        })
    }
}
