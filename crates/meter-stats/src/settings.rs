//! `./settings.json`: process-wide settings, read-mostly (root spec §9
//! design note: "split read-mostly (settings, pause) from write-heavy
//! (users) locks"). Unknown keys round-trip untouched (root spec §8).

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_true")]
    pub auto_clear_on_server_change: bool,
    #[serde(default)]
    pub auto_clear_on_timeout: bool,
    #[serde(default)]
    pub only_record_elite_dummy: bool,
    /// Any keys this binary doesn't recognize, preserved verbatim across a
    /// load -> merge -> save round trip.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_clear_on_server_change: true,
            auto_clear_on_timeout: false,
            only_record_elite_dummy: false,
            extra: serde_json::Map::new(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Merge-writes `patch` over the current settings: recognized keys
    /// update their typed field, unrecognized keys are kept (or added) in
    /// `extra`.
    pub fn merge(&mut self, patch: serde_json::Value) -> anyhow::Result<()> {
        let mut current = serde_json::to_value(&*self)?;
        if let (Some(current_obj), serde_json::Value::Object(patch_obj)) =
            (current.as_object_mut(), patch)
        {
            for (key, value) in patch_obj {
                current_obj.insert(key, value);
            }
        }
        *self = serde_json::from_value(current)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_root_spec() {
        let s = Settings::default();
        assert!(s.auto_clear_on_server_change);
        assert!(!s.auto_clear_on_timeout);
        assert!(!s.only_record_elite_dummy);
    }

    #[test]
    fn round_trip_preserves_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let raw = serde_json::json!({
            "autoClearOnServerChange": true,
            "autoClearOnTimeout": false,
            "onlyRecordEliteDummy": false,
            "futureFeatureFlag": "keep-me",
        });
        std::fs::write(&path, serde_json::to_string(&raw).unwrap()).unwrap();

        let mut settings = Settings::load(&path).unwrap();
        assert_eq!(
            settings.extra.get("futureFeatureFlag"),
            Some(&serde_json::Value::String("keep-me".into()))
        );

        settings.merge(serde_json::json!({ "onlyRecordEliteDummy": true })).unwrap();
        assert!(settings.only_record_elite_dummy);
        assert_eq!(
            settings.extra.get("futureFeatureFlag"),
            Some(&serde_json::Value::String("keep-me".into()))
        );

        settings.save(&path).unwrap();
        let reloaded = Settings::load(&path).unwrap();
        assert!(reloaded.only_record_elite_dummy);
        assert_eq!(
            reloaded.extra.get("futureFeatureFlag"),
            Some(&serde_json::Value::String("keep-me".into()))
        );
    }
}
