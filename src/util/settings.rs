// Copyright (c) 2024 Mike Tsao

//! Structs that hold configuration information about various parts of the
//! system. Intended to be serialized.

use crate::{
    orchestration::TransformerManager,
    timing::{Timer, Transport},
    transformers::{TransformerFactory, TransformerState},
    types::{Tempo, TimeSignature},
};
use anyhow::Context;
use derivative::Derivative;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The persistent configuration of a whole chain: the clock settings and the
/// ordered stages.
#[derive(Clone, Debug, Default, Derivative, Serialize, Deserialize)]
#[derivative(PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct PipelineSettings {
    #[allow(missing_docs)]
    pub tempo: Tempo,
    #[allow(missing_docs)]
    pub time_signature: TimeSignature,
    /// In pipeline order.
    pub transformers: Vec<TransformerState>,

    #[serde(skip)]
    #[derivative(PartialEq = "ignore")]
    has_been_saved: bool,
}
impl PipelineSettings {
    /// Captures a running pipeline.
    pub fn capture(manager: &TransformerManager, transport: &Transport) -> Self {
        Self {
            tempo: transport.tempo(),
            time_signature: transport.time_signature(),
            transformers: manager.states(),
            has_been_saved: false,
        }
    }

    /// Reads settings from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let mut r = Self::from_json(&json).with_context(|| format!("parsing {}", path.display()))?;
        r.mark_clean();
        Ok(r)
    }

    /// Writes settings to a JSON file.
    pub fn save(&mut self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("writing {}", path.display()))?;
        self.mark_clean();
        Ok(())
    }

    #[allow(missing_docs)]
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[allow(missing_docs)]
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builds the live pipeline these settings describe.
    pub fn build_manager(&self, factory: &TransformerFactory) -> anyhow::Result<TransformerManager> {
        TransformerManager::from_states(factory, &self.transformers)
    }

    /// A stopped transport with these clock settings.
    pub fn transport(&self) -> Transport {
        Transport::new_with(self.tempo, self.time_signature)
    }

    /// Whether these settings match what's on disk.
    pub fn has_been_saved(&self) -> bool {
        self.has_been_saved
    }

    /// Marks the settings as changed since the last save.
    pub fn needs_save(&mut self) {
        self.has_been_saved = false;
    }

    fn mark_clean(&mut self) {
        self.has_been_saved = true;
    }
}
