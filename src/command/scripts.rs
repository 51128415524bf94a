// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! Script registry backing `get_scripts`/`run_script`/`stop_script` (§4.4,
//! OQ-3). The concrete process-execution backend is an out-of-scope
//! collaborator (§1); this module supplies the dispatch plumbing and a
//! [`ScriptRunner`] trait seam a real backend can implement.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptDescriptor {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptState {
    Idle,
    Running,
}

/// Narrow capability for actually executing a script. The default build
/// ships [`NoopScriptRunner`]; a real deployment substitutes a backend that
/// shells out, sandboxed appropriately.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn start(&self, name: &str) -> Result<(), String>;
    async fn stop(&self, name: &str) -> Result<(), String>;
}

/// Always succeeds without spawning anything. Exists so `run_script`/
/// `stop_script` have deterministic behavior in tests and in deployments
/// that have not wired a real runner.
pub struct NoopScriptRunner;

#[async_trait]
impl ScriptRunner for NoopScriptRunner {
    async fn start(&self, _name: &str) -> Result<(), String> {
        Ok(())
    }

    async fn stop(&self, _name: &str) -> Result<(), String> {
        Ok(())
    }
}

/// In-memory catalog of known scripts plus their run state, seeded once
/// from config at startup.
pub struct ScriptRegistry {
    descriptors: HashMap<String, ScriptDescriptor>,
    state: DashMap<String, ScriptState>,
    runner: Box<dyn ScriptRunner>,
}

impl ScriptRegistry {
    pub fn new(descriptors: Vec<ScriptDescriptor>) -> Self {
        Self::with_runner(descriptors, Box::new(NoopScriptRunner))
    }

    pub fn with_runner(descriptors: Vec<ScriptDescriptor>, runner: Box<dyn ScriptRunner>) -> Self {
        let state = DashMap::new();
        let mut by_name = HashMap::new();
        for descriptor in descriptors {
            state.insert(descriptor.name.clone(), ScriptState::Idle);
            by_name.insert(descriptor.name.clone(), descriptor);
        }
        Self {
            descriptors: by_name,
            state,
            runner,
        }
    }

    pub fn list(&self) -> Vec<(ScriptDescriptor, ScriptState)> {
        self.descriptors
            .values()
            .map(|d| {
                let state = self.state.get(&d.name).map(|s| *s).unwrap_or(ScriptState::Idle);
                (d.clone(), state)
            })
            .collect()
    }

    pub async fn run(&self, name: &str) -> Result<(), &'static str> {
        if !self.descriptors.contains_key(name) {
            return Err("unknown_script");
        }
        self.runner.start(name).await.map_err(|_| "start_failed")?;
        self.state.insert(name.to_string(), ScriptState::Running);
        Ok(())
    }

    pub async fn stop(&self, name: &str) -> Result<(), &'static str> {
        if !self.descriptors.contains_key(name) {
            return Err("unknown_script");
        }
        self.runner.stop(name).await.map_err(|_| "stop_failed")?;
        self.state.insert(name.to_string(), ScriptState::Idle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_registry() -> ScriptRegistry {
        ScriptRegistry::new(vec![ScriptDescriptor {
            name: "fan_curve".into(),
            description: "ramps fans with load".into(),
        }])
    }

    #[tokio::test]
    async fn run_then_stop_transitions_state() {
        let registry = sample_registry();
        assert_eq!(registry.list()[0].1, ScriptState::Idle);
        registry.run("fan_curve").await.unwrap();
        assert_eq!(registry.list()[0].1, ScriptState::Running);
        registry.stop("fan_curve").await.unwrap();
        assert_eq!(registry.list()[0].1, ScriptState::Idle);
    }

    #[tokio::test]
    async fn unknown_script_rejected() {
        let registry = sample_registry();
        assert_eq!(registry.run("does_not_exist").await, Err("unknown_script"));
    }
}
