//! History snapshots under `./logs/<startTime>/` (root spec §4.8) and the
//! append-only fight log, which root spec §5 calls out as living under its
//! own mutex so it can keep accumulating while the flow mutex is stalled.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;

use crate::manager::{EnemyInfo, UserSnapshot};
use crate::user_data::UserData;

#[derive(Debug, Clone, Serialize)]
pub struct SkillDetailView {
    pub kind: meter_proto::StatKind,
    pub skill: meter_proto::SkillKey,
    pub stats: crate::statistic_data::StatisticData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub start_time: u64,
    pub end_time: u64,
    pub duration: u64,
    pub user_count: usize,
    pub version: &'static str,
    pub max_hp_monster: Option<String>,
}

fn session_dir(base_dir: &Path, start_time: u64) -> PathBuf {
    base_dir.join(start_time.to_string())
}

/// Root spec §4.8: writes `allUserData.json`, `users/<uid>.json`, and
/// `summary.json` for one completed (or in-flight, for the auto-save
/// ticker) session.
pub fn snapshot_session(
    base_dir: &Path,
    start_time: u64,
    end_time: u64,
    users: &HashMap<u64, UserData>,
    enemies: &HashMap<u64, EnemyInfo>,
) -> anyhow::Result<()> {
    let dir = session_dir(base_dir, start_time);
    std::fs::create_dir_all(dir.join("users"))?;

    let all: HashMap<String, UserSnapshot> =
        users.iter().map(|(uid, data)| (uid.to_string(), UserSnapshot::from_user(*uid, data))).collect();
    std::fs::write(dir.join("allUserData.json"), serde_json::to_string_pretty(&all)?)?;

    for (uid, data) in users {
        let details: Vec<SkillDetailView> = data
            .skill_usage
            .iter()
            .map(|(slot, stats)| SkillDetailView {
                kind: slot.kind,
                skill: slot.skill.clone(),
                stats: stats.clone(),
            })
            .collect();
        std::fs::write(
            dir.join("users").join(format!("{uid}.json")),
            serde_json::to_string_pretty(&details)?,
        )?;
    }

    let max_hp_monster = enemies
        .values()
        .filter(|e| e.max_hp > 0)
        .max_by_key(|e| e.max_hp)
        .and_then(|e| e.name.clone());

    let summary = SessionSummary {
        start_time,
        end_time,
        duration: end_time.saturating_sub(start_time),
        user_count: users.len(),
        version: env!("CARGO_PKG_VERSION"),
        max_hp_monster,
    };
    std::fs::write(dir.join("summary.json"), serde_json::to_string_pretty(&summary)?)?;

    Ok(())
}

/// `./logs/<startTime>/fight.log`: timestamped, append-only, never
/// rewritten. Guarded by its own mutex, independent of the statistics lock,
/// so it can keep accepting lines while other state is stalled.
pub struct FightLog {
    state: Mutex<PathBuf>,
}

impl FightLog {
    #[must_use]
    pub fn new(base_dir: &Path, start_time: u64) -> Self {
        Self { state: Mutex::new(session_dir(base_dir, start_time).join("fight.log")) }
    }

    /// Points the log at a new session's directory, called from `clearAll`.
    pub fn roll(&self, base_dir: &Path, start_time: u64) {
        *self.state.lock() = session_dir(base_dir, start_time).join("fight.log");
    }

    pub fn append(&self, now_ms: u64, line: &str) -> anyhow::Result<()> {
        let path = self.state.lock().clone();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "[{now_ms}] {line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user_data::UserData;

    #[test]
    fn snapshot_writes_expected_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut users = HashMap::new();
        let mut u = UserData::new();
        u.damage_stats.add_record(0, 1000, false, false, 1000);
        users.insert(114514u64, u);
        let mut enemies = HashMap::new();
        enemies.insert(1, EnemyInfo { name: Some("Dummy".into()), hp: 500, max_hp: 50_000 });
        enemies.insert(2, EnemyInfo { name: Some("Boss".into()), hp: 10_000, max_hp: 500_000 });

        snapshot_session(dir.path(), 1_000, 61_000, &users, &enemies).unwrap();

        let session_dir = dir.path().join("1000");
        assert!(session_dir.join("allUserData.json").exists());
        assert!(session_dir.join("users").join("114514.json").exists());

        let summary_raw = std::fs::read_to_string(session_dir.join("summary.json")).unwrap();
        let summary: serde_json::Value = serde_json::from_str(&summary_raw).unwrap();
        assert_eq!(summary["duration"], 60_000);
        assert_eq!(summary["maxHpMonster"], "Boss");
    }

    #[test]
    fn fight_log_appends_and_rolls() {
        let dir = tempfile::tempdir().unwrap();
        let log = FightLog::new(dir.path(), 1_000);
        log.append(1_000, "hello").unwrap();
        log.append(1_001, "world").unwrap();
        let contents = std::fs::read_to_string(dir.path().join("1000").join("fight.log")).unwrap();
        assert_eq!(contents, "[1000] hello\n[1001] world\n");

        log.roll(dir.path(), 2_000);
        log.append(2_000, "new session").unwrap();
        assert!(!dir.path().join("1000").join("fight.log").to_str().unwrap().is_empty());
        let contents2 = std::fs::read_to_string(dir.path().join("2000").join("fight.log")).unwrap();
        assert_eq!(contents2, "[2000] new session\n");
    }
}
