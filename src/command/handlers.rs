// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 The neonlink-core Authors

//! One function per whitelisted command (§4.4). Each handler validates its
//! own params and returns a bare `serde_json::Value` result on success; the
//! dispatcher wraps it into a `CommandResponse`.

use serde::Deserialize;
use serde_json::Value;

use crate::cache::Cache;
use crate::channel::TelemetryChannel;
use crate::clock::Clock;
use crate::config::{Config, SharedConfig};
use crate::error::NeonLinkError;
use crate::snapshot::SCHEMA_VERSION;

use super::scripts::ScriptRegistry;

pub fn ping() -> Result<Value, NeonLinkError> {
    Ok(Value::String("pong".to_string()))
}

/// Reads the latest snapshot the sampling loop already published rather
/// than sampling hardware itself. The `Sampler` contract (§4.1) confines
/// probing to that one task, so a per-command re-sample here would both
/// violate it and duplicate a full hardware probe outside the loop's
/// cadence on every cache miss.
pub async fn get_status(
    cache: &Cache<Value>,
    ttl: std::time::Duration,
    telemetry: &TelemetryChannel,
    clock: &dyn Clock,
    started_at_ms: i64,
) -> Result<Value, NeonLinkError> {
    let uptime_sec = ((clock.now_ms() - started_at_ms).max(0) / 1000) as u64;
    cache
        .get_or_insert_with("get_status", ttl, || async {
            let (schema_version, admin_level) = match telemetry.current() {
                Some(snapshot) => (snapshot.schema_version.clone(), snapshot.admin_level),
                None => (SCHEMA_VERSION.to_string(), crate::snapshot::AdminLevel::None),
            };
            Ok::<Value, NeonLinkError>(serde_json::json!({
                "uptimeSec": uptime_sec,
                "schemaVersion": schema_version,
                "adminLevel": admin_level,
            }))
        })
        .await
}

pub fn get_config(config: &Config) -> Result<Value, NeonLinkError> {
    serde_json::to_value(config).map_err(|e| NeonLinkError::Internal(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct SetPollingIntervalParams {
    #[serde(rename = "intervalMs")]
    interval_ms: u64,
}

pub fn set_polling_interval(params: &Value, config: &SharedConfig) -> Result<Value, NeonLinkError> {
    let params: SetPollingIntervalParams = serde_json::from_value(params.clone())
        .map_err(|e| NeonLinkError::ProtocolError(e.to_string()))?;

    if !(50..=10_000).contains(&params.interval_ms) {
        return Err(NeonLinkError::ProtocolError(
            "intervalMs must be in 50..=10000".to_string(),
        ));
    }

    let mut next = (*config.load()).clone();
    next.server.polling_interval_ms = params.interval_ms;
    config.store(next);
    Ok(serde_json::json!({ "pollingIntervalMs": params.interval_ms }))
}

pub fn set_config(params: &Value, config: &SharedConfig) -> Result<Value, NeonLinkError> {
    let mut next = (*config.load()).clone();
    merge_config_patch(&mut next, params)?;
    next.validate()?;
    config.store(next.clone());
    serde_json::to_value(&next).map_err(|e| NeonLinkError::Internal(e.to_string()))
}

/// Apply a partial JSON object onto an existing `Config` by round-tripping
/// through a merged `serde_json::Value` rather than hand-writing per-field
/// setters, so new config fields never need a matching merge arm.
fn merge_config_patch(config: &mut Config, patch: &Value) -> Result<(), NeonLinkError> {
    if !patch.is_object() {
        return Err(NeonLinkError::ProtocolError("params must be an object".to_string()));
    }
    let mut current = serde_json::to_value(&*config).map_err(|e| NeonLinkError::Internal(e.to_string()))?;
    json_merge(&mut current, patch);
    *config = serde_json::from_value(current).map_err(|e| NeonLinkError::ProtocolError(e.to_string()))?;
    Ok(())
}

fn json_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                json_merge(base_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (base_slot, patch_value) => {
            *base_slot = patch_value.clone();
        }
    }
}

pub fn get_scripts(registry: &ScriptRegistry) -> Result<Value, NeonLinkError> {
    let scripts: Vec<Value> = registry
        .list()
        .into_iter()
        .map(|(descriptor, state)| {
            serde_json::json!({
                "name": descriptor.name,
                "description": descriptor.description,
                "state": state,
            })
        })
        .collect();
    Ok(Value::Array(scripts))
}

#[derive(Debug, Deserialize)]
struct ScriptNameParams {
    name: String,
}

pub async fn run_script(params: &Value, registry: &ScriptRegistry) -> Result<Value, NeonLinkError> {
    let params: ScriptNameParams = serde_json::from_value(params.clone())
        .map_err(|e| NeonLinkError::ProtocolError(e.to_string()))?;
    registry
        .run(&params.name)
        .await
        .map_err(|e| NeonLinkError::ProtocolError(e.to_string()))?;
    Ok(serde_json::json!({ "name": params.name, "state": "running" }))
}

pub async fn stop_script(params: &Value, registry: &ScriptRegistry) -> Result<Value, NeonLinkError> {
    let params: ScriptNameParams = serde_json::from_value(params.clone())
        .map_err(|e| NeonLinkError::ProtocolError(e.to_string()))?;
    registry
        .stop(&params.name)
        .await
        .map_err(|e| NeonLinkError::ProtocolError(e.to_string()))?;
    Ok(serde_json::json!({ "name": params.name, "state": "idle" }))
}

#[derive(Debug, Deserialize)]
struct RgbEffectParams {
    effect: String,
    #[serde(default)]
    color: Option<String>,
}

/// No RGB controller backend ships with this repo (§1's out-of-scope
/// hardware collaborators); accepting the command here and echoing it back
/// is the full implementation until a vendor driver is wired in.
pub fn rgb_effect(params: &Value) -> Result<Value, NeonLinkError> {
    let params: RgbEffectParams = serde_json::from_value(params.clone())
        .map_err(|e| NeonLinkError::ProtocolError(e.to_string()))?;
    Ok(serde_json::json!({ "effect": params.effect, "color": params.color }))
}

#[derive(Debug, Deserialize)]
struct SetFanSpeedParams {
    #[serde(rename = "fanId")]
    fan_id: String,
    #[serde(rename = "percent")]
    percent: f32,
}

pub fn set_fan_speed(params: &Value) -> Result<Value, NeonLinkError> {
    let params: SetFanSpeedParams = serde_json::from_value(params.clone())
        .map_err(|e| NeonLinkError::ProtocolError(e.to_string()))?;
    if !(0.0..=100.0).contains(&params.percent) {
        return Err(NeonLinkError::ProtocolError("percent must be in 0..=100".to_string()));
    }
    Ok(serde_json::json!({ "fanId": params.fan_id, "percent": params.percent }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::scripts::ScriptDescriptor;

    #[test]
    fn ping_is_pong() {
        assert_eq!(ping().unwrap(), Value::String("pong".into()));
    }

    #[test]
    fn set_polling_interval_rejects_out_of_range() {
        let shared = SharedConfig::new(Config::default());
        let result = set_polling_interval(&serde_json::json!({"intervalMs": 1}), &shared);
        assert!(result.is_err());
    }

    #[test]
    fn set_polling_interval_applies_value() {
        let shared = SharedConfig::new(Config::default());
        set_polling_interval(&serde_json::json!({"intervalMs": 2000}), &shared).unwrap();
        assert_eq!(shared.load().server.polling_interval_ms, 2000);
    }

    #[test]
    fn set_config_merges_partial_patch() {
        let shared = SharedConfig::new(Config::default());
        set_config(&serde_json::json!({"security": {"rateLimitPerMinute": 42}}), &shared).unwrap();
        assert_eq!(shared.load().security.rate_limit_per_minute, 42);
        // unrelated fields survive the merge
        assert_eq!(shared.load().server.port, Config::default().server.port);
    }

    #[test]
    fn rgb_effect_rejects_missing_fields() {
        assert!(rgb_effect(&serde_json::json!({})).is_err());
    }

    #[test]
    fn set_fan_speed_rejects_out_of_range_percent() {
        assert!(set_fan_speed(&serde_json::json!({"fanId": "f1", "percent": 150.0})).is_err());
    }

    #[tokio::test]
    async fn get_scripts_reports_seeded_registry() {
        let registry = ScriptRegistry::new(vec![ScriptDescriptor {
            name: "boost".into(),
            description: "test".into(),
        }]);
        let value = get_scripts(&registry).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
    }
}
