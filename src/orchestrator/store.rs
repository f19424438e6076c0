// Copyright (c) 2025 - Cowboy AI, Inc.
//! Write-once output store
//!
//! Each unit publishes its output once; afterwards it is immutable for the
//! rest of the run and shared by reference with every dependent.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::unit::{UnitContext, UnitId, UnitOutput};
use crate::errors::{ProvisioningError, ProvisioningResult};

#[derive(Debug, Default)]
pub struct OutputStore {
    outputs: RwLock<HashMap<UnitId, Arc<UnitOutput>>>,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a unit's output; a second publish for the same unit is rejected
    pub async fn publish(&self, unit: &UnitId, output: UnitOutput) -> ProvisioningResult<Arc<UnitOutput>> {
        let mut outputs = self.outputs.write().await;
        if outputs.contains_key(unit) {
            return Err(ProvisioningError::StateGuardViolation(format!(
                "output of unit '{}' already published",
                unit
            )));
        }
        let output = Arc::new(output);
        outputs.insert(unit.clone(), Arc::clone(&output));
        Ok(output)
    }

    pub async fn get(&self, unit: &UnitId) -> Option<Arc<UnitOutput>> {
        self.outputs.read().await.get(unit).cloned()
    }

    pub async fn is_published(&self, unit: &UnitId) -> bool {
        self.outputs.read().await.contains_key(unit)
    }

    /// Inputs of `unit` that have not been published yet
    pub async fn unmet(&self, inputs: &[UnitId]) -> Vec<UnitId> {
        let outputs = self.outputs.read().await;
        inputs
            .iter()
            .filter(|input| !outputs.contains_key(*input))
            .cloned()
            .collect()
    }

    /// Snapshot the declared inputs of `unit` into a context
    pub async fn context_for(&self, unit: &UnitId, inputs: &[UnitId]) -> ProvisioningResult<UnitContext> {
        let outputs = self.outputs.read().await;
        let mut snapshot = HashMap::with_capacity(inputs.len());
        for input in inputs {
            let output = outputs
                .get(input)
                .ok_or_else(|| ProvisioningError::DependencyUnavailable {
                    unit: unit.to_string(),
                    input: input.to_string(),
                })?;
            snapshot.insert(input.clone(), Arc::clone(output));
        }
        Ok(UnitContext::new(unit.clone(), snapshot))
    }

    pub async fn snapshot(&self) -> HashMap<UnitId, Arc<UnitOutput>> {
        self.outputs.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn skipped() -> UnitOutput {
        UnitOutput::Skipped {
            reason: "test".into(),
        }
    }

    #[tokio::test]
    async fn test_publish_is_write_once() {
        let store = OutputStore::new();
        store.publish(&UnitId::compute(), skipped()).await.unwrap();

        let err = store.publish(&UnitId::compute(), skipped()).await.unwrap_err();
        assert_eq!(err.category(), "state_guard");
        assert!(store.get(&UnitId::compute()).await.unwrap().is_skipped());
    }

    #[tokio::test]
    async fn test_context_requires_every_input() {
        let store = OutputStore::new();
        store.publish(&UnitId::compute(), skipped()).await.unwrap();

        let inputs = vec![UnitId::network(), UnitId::compute()];
        assert_eq!(store.unmet(&inputs).await, vec![UnitId::network()]);

        let err = store
            .context_for(&UnitId::discovery(), &inputs)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisioningError::DependencyUnavailable { ref input, .. } if input == "network"
        ));

        let context = store
            .context_for(&UnitId::discovery(), &[UnitId::compute()])
            .await
            .unwrap();
        assert!(context.compute(&UnitId::compute()).unwrap().is_none());
    }
}
