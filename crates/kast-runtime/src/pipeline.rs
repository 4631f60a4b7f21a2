//! The function pipeline: resolve the module, load it, fill it, validate it
//! and extract its outputs.

use std::path::Path;

use kast_common::config::FunctionConfig;
use kast_common::constants::OUTPUTS_PATH;
use kast_common::types::{ResourceItem, json_kind};
use kast_engine::{ConstraintEngine, Engine, Instance};
use kast_select::{IncludeIndex, build_include_index};
use serde_json::Value;

use crate::builder::FunctionOptions;
use crate::error::{FillStage, FunctionError};
use crate::provider::{LocalProvider, ModuleProvider, OciProvider};

/// A configured function, runnable once per `ResourceList`.
#[derive(Debug)]
pub struct Function<E: Engine = ConstraintEngine> {
    options: FunctionOptions,
    engine: E,
}

impl Function<ConstraintEngine> {
    /// Creates a function using the built-in engine.
    #[must_use]
    pub const fn new(options: FunctionOptions) -> Self {
        Self {
            options,
            engine: ConstraintEngine::new(),
        }
    }
}

impl<E: Engine> Function<E> {
    /// Creates a function using `engine`.
    #[must_use]
    pub const fn with_engine(options: FunctionOptions, engine: E) -> Self {
        Self { options, engine }
    }

    /// The options the function runs with.
    #[must_use]
    pub const fn options(&self) -> &FunctionOptions {
        &self.options
    }

    /// Runs the pipeline over `items`.
    ///
    /// Returns the items unchanged in validator mode, otherwise the items
    /// followed by the module outputs.
    ///
    /// # Errors
    ///
    /// Returns the `FunctionError` of the first stage that fails; no partial
    /// output is produced.
    pub fn run(
        &self,
        items: Vec<ResourceItem>,
        config: &FunctionConfig,
    ) -> Result<Vec<ResourceItem>, FunctionError> {
        let provider = self.provider_for(config);
        provider.prepare(&items)?;

        let includes = build_include_index(&config.includes, &items)?;
        tracing::debug!(count = includes.len(), "include index built");

        let instances = self.load(provider.path())?;
        let schema = self.build_schema(&instances)?;
        let filled = self.fill(schema, config, &includes, &instances)?;

        self.engine
            .validate_concrete(&filled)
            .map_err(|source| FunctionError::Concreteness {
                diagnostics: self.engine.diagnostics(&source, &instances),
                source,
            })?;

        if config.is_validator() {
            tracing::info!("validator mode: returning input items unchanged");
            return Ok(items);
        }

        let outputs = self.extract_outputs(&filled)?;
        tracing::info!(inputs = items.len(), outputs = outputs.len(), "module outputs extracted");
        let mut result = items;
        result.extend(outputs);
        Ok(result)
    }

    fn provider_for(&self, config: &FunctionConfig) -> Box<dyn ModuleProvider> {
        match &config.remote_module {
            Some(remote) => Box::new(OciProvider::new(
                remote.clone(),
                self.options.module_path.clone(),
                self.options.connector.clone(),
                self.options.transfer.clone(),
                self.options.env.clone(),
            )),
            None => Box::new(LocalProvider::new(self.options.module_path.clone())),
        }
    }

    fn load(&self, path: &Path) -> Result<Vec<Instance<E::Value>>, FunctionError> {
        let instances = self
            .engine
            .load_dir(path)
            .map_err(|source| FunctionError::Load {
                path: path.to_path_buf(),
                diagnostics: self.engine.diagnostics(&source, &[]),
                source,
            })?;
        tracing::info!(path = %path.display(), instances = instances.len(), "module loaded");
        Ok(instances)
    }

    fn build_schema(&self, instances: &[Instance<E::Value>]) -> Result<E::Value, FunctionError> {
        let Some((first, rest)) = instances.split_first() else {
            return Err(FunctionError::config("module has no instances"));
        };
        let mut schema = first.value.clone();
        for (i, instance) in rest.iter().enumerate() {
            schema = self
                .engine
                .unify(&schema, &instance.value)
                .map_err(|source| FunctionError::SchemaConflict {
                    instance: instance.name.clone(),
                    diagnostics: self.engine.diagnostics(&source, &instances[..=i + 1]),
                    source,
                })?;
        }
        Ok(schema)
    }

    fn fill(
        &self,
        schema: E::Value,
        config: &FunctionConfig,
        includes: &IncludeIndex,
        instances: &[Instance<E::Value>],
    ) -> Result<E::Value, FunctionError> {
        let mut value = schema;
        for stage in FillStage::ALL {
            let content = match stage {
                FillStage::ApiVersion => Value::String(config.api_version.clone()),
                FillStage::Kind => Value::String(config.kind.clone()),
                FillStage::Metadata => Value::Object(config.metadata.clone()),
                FillStage::Input => Value::Object(config.input.clone()),
                FillStage::Includes => includes.to_value(),
            };
            value = self
                .engine
                .fill_path(&value, stage.path(), &content)
                .map_err(|source| FunctionError::Unification {
                    stage,
                    diagnostics: self.engine.diagnostics(&source, instances),
                    source,
                })?;
            tracing::debug!(%stage, "filled");
        }
        Ok(value)
    }

    fn extract_outputs(&self, value: &E::Value) -> Result<Vec<ResourceItem>, FunctionError> {
        let shape = |message: String| FunctionError::OutputShape { message };
        let outputs = self
            .engine
            .lookup_path(value, OUTPUTS_PATH)
            .map_err(|e| shape(e.to_string()))?
            .ok_or_else(|| shape(format!("module has no \"{OUTPUTS_PATH}\" field")))?;
        let exported = self
            .engine
            .export(&outputs)
            .map_err(|e| shape(e.to_string()))?;

        let elements: Vec<(String, Value)> = match exported {
            Value::Array(list) => list
                .into_iter()
                .enumerate()
                .map(|(i, v)| (format!("{OUTPUTS_PATH}[{i}]"), v))
                .collect(),
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| (format!("{OUTPUTS_PATH}.{k}"), v))
                .collect(),
            other => {
                return Err(shape(format!(
                    "\"{OUTPUTS_PATH}\" must be a list or a struct, got {}",
                    json_kind(&other)
                )));
            }
        };

        elements
            .into_iter()
            .map(|(at, element)| {
                if !element.is_object() {
                    return Err(shape(format!(
                        "{at} must be a struct, got {}",
                        json_kind(&element)
                    )));
                }
                ResourceItem::from_value(element).map_err(|e| shape(format!("{at}: {e}")))
            })
            .collect()
    }
}
