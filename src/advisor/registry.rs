//! Model registry: a catalog of known descriptors plus file-backed entries
//! discovered from downloaded sidecar metadata (spec.md §4.7, §6).

use std::path::Path;

use crate::error::RuntimeError;
use crate::types::{Capability, DeviceProfile, ModelDescriptor, ModelMetadataFile};

use super::gguf_introspect::describe_gguf_file;
use super::memory::estimate_memory;
use super::scoring::{score_model, ModelScore, UseCase};

#[derive(Debug, Default)]
pub struct ModelRegistry {
    descriptors: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ModelDescriptor) {
        self.descriptors.retain(|existing| existing.id != descriptor.id);
        self.descriptors.push(descriptor);
    }

    /// Loads a descriptor from a downloaded model's sidecar metadata file
    /// (spec.md §6) and registers it.
    pub fn register_from_metadata_json(&mut self, json: &str) -> Result<(), serde_json::Error> {
        let file: ModelMetadataFile = serde_json::from_str(json)?;
        self.register(file.model);
        Ok(())
    }

    /// Reads a downloaded GGUF file's embedded metadata (falling back to
    /// filename heuristics) and registers the resulting descriptor. Used
    /// when a model was fetched from an arbitrary URL rather than the
    /// built-in catalog, so its facts have to come from the file itself.
    pub fn register_from_gguf_file(
        &mut self,
        path: &Path,
        id: &str,
        download_url: Option<String>,
        sha256: Option<String>,
        capabilities: Vec<Capability>,
    ) -> Result<(), RuntimeError> {
        let descriptor = describe_gguf_file(path, id, download_url, sha256, capabilities)?;
        self.register(descriptor);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.descriptors.iter()
    }

    /// Ranks every registered descriptor for `use_case` on `device`, most
    /// recommended first. `context_length`/`gpu` feed the memory estimate
    /// used to decide whether each model fits the device's safe budget.
    pub fn recommend(
        &self,
        use_case: UseCase,
        device: &DeviceProfile,
        context_length: u32,
        gpu: bool,
    ) -> Vec<(&ModelDescriptor, ModelScore)> {
        let budget = device.safe_budget_bytes();
        let mut ranked: Vec<(&ModelDescriptor, ModelScore)> = self
            .descriptors
            .iter()
            .map(|descriptor| {
                let estimate = estimate_memory(
                    descriptor,
                    context_length,
                    crate::types::KvQuant::F16,
                    crate::types::KvQuant::F16,
                    gpu,
                );
                let budget_usage_percent = if budget == 0 { 100.0 } else { estimate.total_bytes() as f64 / budget as f64 * 100.0 };
                (descriptor, score_model(descriptor, use_case, device, budget_usage_percent, context_length))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.composite.partial_cmp(&a.1.composite).unwrap());
        ranked
    }

    pub fn best_for(&self, use_case: UseCase, device: &DeviceProfile, context_length: u32, gpu: bool) -> Option<&ModelDescriptor> {
        self.recommend(use_case, device, context_length, gpu).into_iter().next().map(|(d, _)| d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Capability, ModelFamily, ModelFormat, Quantization};

    fn descriptor(id: &str, size_bytes: u64, params_billions: f64) -> ModelDescriptor {
        ModelDescriptor {
            id: id.into(),
            display_name: id.into(),
            family: ModelFamily::TinyLlama,
            size_bytes,
            format: ModelFormat::Gguf,
            quantization: Quantization::Q4KM,
            params_billions,
            sha256: None,
            download_url: None,
            max_context_length: 4096,
            capabilities: vec![Capability::Chat],
            companion_id: None,
        }
    }

    fn device() -> DeviceProfile {
        DeviceProfile { total_ram_bytes: 4_000_000_000, chip_multiplier: 1.0, has_gpu: false }
    }

    #[test]
    fn registering_same_id_twice_replaces_it() {
        let mut registry = ModelRegistry::new();
        registry.register(descriptor("m", 1, 1.0));
        registry.register(descriptor("m", 2, 1.0));
        assert_eq!(registry.get("m").unwrap().size_bytes, 2);
    }

    #[test]
    fn a_model_that_blows_the_budget_ranks_below_one_that_fits() {
        let mut registry = ModelRegistry::new();
        registry.register(descriptor("huge", 100_000_000_000, 70.0));
        registry.register(descriptor("small", 700_000_000, 1.1));
        let ranked = registry.recommend(UseCase::Chat, &device(), 2048, false);
        assert_eq!(ranked[0].0.id, "small");
    }

    #[test]
    fn metadata_json_round_trip_registers_the_model() {
        let mut registry = ModelRegistry::new();
        let file = ModelMetadataFile { model: descriptor("from-json", 1, 1.0), downloaded_at: "2026-01-01T00:00:00Z".into() };
        let json = serde_json::to_string(&file).unwrap();
        registry.register_from_metadata_json(&json).unwrap();
        assert!(registry.get("from-json").is_some());
    }

    #[test]
    fn registering_from_a_missing_gguf_file_fails_without_touching_the_registry() {
        let mut registry = ModelRegistry::new();
        let result = registry.register_from_gguf_file(
            std::path::Path::new("/nonexistent/model.gguf"),
            "m",
            None,
            None,
            vec![Capability::Chat],
        );
        assert!(result.is_err());
        assert!(registry.get("m").is_none());
    }

    #[test]
    fn empty_registry_recommends_nothing() {
        let registry = ModelRegistry::new();
        assert!(registry.best_for(UseCase::Chat, &device(), 2048, false).is_none());
    }
}
