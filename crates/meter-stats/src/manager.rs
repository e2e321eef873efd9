//! `UserDataManager` (root spec §3/§4.8): the statistics engine. Implements
//! [`meter_proto::EventSink`] so it can be handed directly to whatever frame
//! decoder is wired up; owns every piece of process-wide mutable state the
//! root spec calls out (`users`, `userCache`, `hpCache`, `enemyCache`,
//! `isPaused`, `globalSettings`) behind a split of read-mostly
//! (settings, pause) and write-heavy (users) locks, per the design note in
//! root spec §9.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use meter_proto::{DamageRecord, EventSink, HealingRecord, StatKind};
use parking_lot::RwLock;
use serde::Serialize;

use crate::cache::{CacheDebouncer, CachedIdentity, UserCache};
use crate::persistence::{self, FightLog, SkillDetailView};
use crate::settings::Settings;
use crate::statistic_data::{Counts, Totals};
use crate::subprofession;
use crate::user_data::UserData;

/// Idle timeout for `checkTimeoutClear` (root spec §4.8).
const TIMEOUT_CLEAR_MS: u64 = 15_000;

#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, serde::Deserialize)]
pub struct EnemyInfo {
    pub name: Option<String>,
    pub hp: i64,
    pub max_hp: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    pub uid: u64,
    pub name: String,
    pub profession: String,
    pub fight_point: i64,
    pub hp: i64,
    pub max_hp: i64,
    pub taken_damage: u64,
    pub dead_count: u64,
    pub total_damage: Totals,
    pub total_count: Counts,
    pub realtime_dps: u64,
    pub realtime_dps_max: u64,
    pub total_healing: Totals,
    pub total_healing_count: Counts,
    pub realtime_hps: u64,
    pub realtime_hps_max: u64,
}

impl UserSnapshot {
    #[must_use]
    pub fn from_user(uid: u64, data: &UserData) -> Self {
        Self {
            uid,
            name: data.name.clone(),
            profession: subprofession::display_profession(&data.profession, &data.sub_profession),
            fight_point: data.fight_point,
            hp: data.attr.get("hp").copied().unwrap_or(0),
            max_hp: data.attr.get("max_hp").copied().unwrap_or(0),
            taken_damage: data.taken_damage,
            dead_count: data.dead_count,
            total_damage: data.damage_stats.totals.clone(),
            total_count: data.damage_stats.counts.clone(),
            realtime_dps: data.damage_stats.realtime.value,
            realtime_dps_max: data.damage_stats.realtime.max,
            total_healing: data.healing_stats.totals.clone(),
            total_healing_count: data.healing_stats.counts.clone(),
            realtime_hps: data.healing_stats.realtime.value,
            realtime_hps_max: data.healing_stats.realtime.max,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DataSnapshot {
    pub user: HashMap<String, UserSnapshot>,
    pub enemy: HashMap<String, EnemyInfo>,
}

pub struct UserDataManager {
    users: RwLock<HashMap<u64, UserData>>,
    user_cache: Arc<UserCache>,
    cache_debouncer: CacheDebouncer,
    hp_cache: RwLock<HashMap<u64, i64>>,
    enemy_cache: RwLock<HashMap<u64, EnemyInfo>>,
    start_time: RwLock<u64>,
    last_log_time: AtomicU64,
    last_auto_save_time: AtomicU64,
    paused: AtomicBool,
    settings: RwLock<Settings>,
    fight_log: FightLog,
    logs_dir: PathBuf,
    users_cache_path: PathBuf,
}

impl UserDataManager {
    /// Root spec §4.10: "At startup: load settings, load user cache."
    pub fn load(
        logs_dir: PathBuf,
        users_cache_path: PathBuf,
        settings_path: PathBuf,
        start_time_ms: u64,
    ) -> anyhow::Result<Arc<Self>> {
        let settings = Settings::load(&settings_path)?;
        let user_cache = Arc::new(UserCache::load(&users_cache_path)?);
        let cache_debouncer = CacheDebouncer::spawn(user_cache.clone(), users_cache_path.clone());
        let fight_log = FightLog::new(&logs_dir, start_time_ms);
        Ok(Arc::new(Self {
            users: RwLock::new(HashMap::new()),
            user_cache,
            cache_debouncer,
            hp_cache: RwLock::new(HashMap::new()),
            enemy_cache: RwLock::new(HashMap::new()),
            start_time: RwLock::new(start_time_ms),
            last_log_time: AtomicU64::new(0),
            last_auto_save_time: AtomicU64::new(start_time_ms),
            paused: AtomicBool::new(false),
            settings: RwLock::new(settings),
            fight_log,
            logs_dir,
            users_cache_path,
        }))
    }

    #[cfg(test)]
    fn for_tests(start_time_ms: u64) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            user_cache: Arc::new(UserCache::default()),
            cache_debouncer: CacheDebouncer::noop(),
            hp_cache: RwLock::new(HashMap::new()),
            enemy_cache: RwLock::new(HashMap::new()),
            start_time: RwLock::new(start_time_ms),
            last_log_time: AtomicU64::new(0),
            last_auto_save_time: AtomicU64::new(start_time_ms),
            paused: AtomicBool::new(false),
            settings: RwLock::new(Settings::default()),
            fight_log: FightLog::new(&PathBuf::from("/tmp/meter-stats-tests-unused"), start_time_ms),
            logs_dir: PathBuf::from("/tmp/meter-stats-tests-unused"),
            users_cache_path: PathBuf::from("/dev/null"),
        }
    }

    fn record_activity(&self, now_ms: u64) {
        self.last_log_time.store(now_ms, Ordering::Relaxed);
    }

    /// Returns `false` if the call should be silently dropped per the
    /// gating rules at the top of root spec §4.8. `checkTimeoutClear` always
    /// runs first, independent of the other gates, since it is itself a
    /// side-effecting maintenance step rather than a per-call filter.
    fn gate_entry(&self, now_ms: u64, is_add_damage: bool, target_uid: Option<u64>) -> bool {
        self.check_timeout_clear(now_ms);

        if self.paused.load(Ordering::Relaxed) {
            return false;
        }
        if is_add_damage {
            let only_elite_dummy = self.settings.read().only_record_elite_dummy;
            if only_elite_dummy && target_uid != Some(75) {
                return false;
            }
        }
        true
    }

    fn check_timeout_clear(&self, now_ms: u64) {
        if !self.settings.read().auto_clear_on_timeout {
            return;
        }
        let last_log = self.last_log_time.load(Ordering::Relaxed);
        if last_log == 0 {
            return;
        }
        if self.users.read().is_empty() {
            return;
        }
        if now_ms.saturating_sub(last_log) > TIMEOUT_CLEAR_MS {
            self.clear_all(now_ms);
        }
    }

    /// Root spec §4.8: "transfers the current `users` map and `startTime`
    /// to the snapshot routine, then replaces both with a fresh empty map
    /// and `now`." Persistence failures are logged, not propagated: losing
    /// a history snapshot must never interrupt capture and live stats.
    pub fn clear_all(&self, now_ms: u64) {
        let old_start = std::mem::replace(&mut *self.start_time.write(), now_ms);
        let outgoing_users = std::mem::take(&mut *self.users.write());
        let enemies = self.enemy_cache.read().clone();

        if let Err(err) = persistence::snapshot_session(&self.logs_dir, old_start, now_ms, &outgoing_users, &enemies) {
            tracing::error!(%err, old_start, "history snapshot failed on clearAll");
        }
        self.fight_log.roll(&self.logs_dir, now_ms);
        self.last_auto_save_time.store(now_ms, Ordering::Relaxed);
    }

    /// Root spec §4.4: "Whenever `current_server` changes ... enemy cache
    /// is cleared unconditionally; user stats are cleared only if
    /// `autoClearOnServerChange` is true AND the previous session had
    /// observed activity."
    pub fn on_server_change(&self, now_ms: u64) {
        self.enemy_cache.write().clear();
        let auto_clear = self.settings.read().auto_clear_on_server_change;
        let had_activity = self.last_log_time.load(Ordering::Relaxed) != 0 && !self.users.read().is_empty();
        if auto_clear && had_activity {
            self.clear_all(now_ms);
        }
    }

    /// Root spec §4.8/§5: realtime ticker, run every 100 ms.
    pub fn tick_realtime(&self, now_ms: u64) {
        let mut users = self.users.write();
        for user in users.values_mut() {
            user.damage_stats.update_realtime_stats(now_ms);
            user.healing_stats.update_realtime_stats(now_ms);
        }
    }

    /// Root spec §4.8: auto-save ticker, run every 10 s; only writes when
    /// there has been activity since the last save.
    pub fn tick_auto_save(&self, now_ms: u64) {
        let last_log = self.last_log_time.load(Ordering::Relaxed);
        let last_save = self.last_auto_save_time.load(Ordering::Relaxed);
        if last_log == 0 || last_log < last_save {
            return;
        }
        let start_time = *self.start_time.read();
        let users = self.users.read().clone();
        let enemies = self.enemy_cache.read().clone();
        if let Err(err) = persistence::snapshot_session(&self.logs_dir, start_time, now_ms, &users, &enemies) {
            tracing::error!(%err, "auto-save snapshot failed");
        }
        self.last_auto_save_time.store(now_ms, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    #[must_use]
    pub fn settings_snapshot(&self) -> Settings {
        self.settings.read().clone()
    }

    pub fn merge_settings(&self, patch: serde_json::Value, settings_path: &std::path::Path) -> anyhow::Result<Settings> {
        let mut settings = self.settings.write();
        settings.merge(patch)?;
        settings.save(settings_path)?;
        Ok(settings.clone())
    }

    #[must_use]
    pub fn snapshot(&self) -> DataSnapshot {
        let user = self
            .users
            .read()
            .iter()
            .map(|(uid, data)| (uid.to_string(), UserSnapshot::from_user(*uid, data)))
            .collect();
        let enemy = self.enemy_cache.read().iter().map(|(id, info)| (id.to_string(), info.clone())).collect();
        DataSnapshot { user, enemy }
    }

    #[must_use]
    pub fn skill_detail(&self, uid: u64) -> Option<Vec<SkillDetailView>> {
        let users = self.users.read();
        let data = users.get(&uid)?;
        Some(
            data.skill_usage
                .iter()
                .map(|(slot, stats)| SkillDetailView { kind: slot.kind, skill: slot.skill.clone(), stats: stats.clone() })
                .collect(),
        )
    }

    /// Root spec §4.10: "On SIGINT/SIGTERM: flush the debounced cache,
    /// synchronously snapshot the current session, exit."
    pub fn shutdown(&self, now_ms: u64) {
        if let Err(err) = self.user_cache.flush(&self.users_cache_path) {
            tracing::error!(%err, "identity cache flush failed at shutdown");
        }
        let start_time = *self.start_time.read();
        let users = self.users.read();
        let enemies = self.enemy_cache.read();
        if let Err(err) = persistence::snapshot_session(&self.logs_dir, start_time, now_ms, &users, &enemies) {
            tracing::error!(%err, "final session snapshot failed at shutdown");
        }
    }

    fn touch_identity(&self, uid: u64, f: impl FnOnce(&mut CachedIdentity)) {
        let mut entries = self.user_cache.entries.write();
        let entry = entries.entry(uid.to_string()).or_default();
        f(entry);
        drop(entries);
        self.cache_debouncer.mark_dirty();
    }

    fn add_damage_at(&self, now_ms: u64, record: DamageRecord) {
        if !self.gate_entry(now_ms, true, Some(record.target_uid)) {
            return;
        }
        self.record_activity(now_ms);

        let inferred_sub = subprofession::infer(&record.skill);
        let value = record.damage.max(0) as u64;
        let hp_lessen = record.hp_lessen.max(0) as u64;

        let mut users = self.users.write();
        let user = users.entry(record.uid).or_insert_with(UserData::new);
        if let Some(sub) = inferred_sub {
            user.sub_profession = sub.to_string();
        }
        user.damage_stats.add_record(now_ms, value, record.is_crit, record.is_lucky, hp_lessen);
        let skill_stat = user.skill_stat_mut(StatKind::Damage, record.skill);
        skill_stat.add_record(now_ms, value, record.is_crit, record.is_lucky, hp_lessen);
        skill_stat.clear_window();
    }

    fn add_healing_at(&self, now_ms: u64, record: HealingRecord) {
        if !self.gate_entry(now_ms, false, None) {
            return;
        }
        self.record_activity(now_ms);

        let inferred_sub = subprofession::infer(&record.skill);
        let value = record.healing.max(0) as u64;

        let mut users = self.users.write();
        let user = users.entry(record.uid).or_insert_with(UserData::new);
        if let Some(sub) = inferred_sub {
            user.sub_profession = sub.to_string();
        }
        user.healing_stats.add_record(now_ms, value, record.is_crit, record.is_lucky, 0);
        let skill_stat = user.skill_stat_mut(StatKind::Healing, record.skill);
        skill_stat.add_record(now_ms, value, record.is_crit, record.is_lucky, 0);
        skill_stat.clear_window();
    }

    fn add_taken_damage_at(&self, now_ms: u64, uid: u64, damage: i64, is_dead: bool) {
        if !self.gate_entry(now_ms, false, None) {
            return;
        }
        self.record_activity(now_ms);

        let mut users = self.users.write();
        let user = users.entry(uid).or_insert_with(UserData::new);
        user.taken_damage = user.taken_damage.saturating_add(damage.max(0) as u64);
        if is_dead {
            user.dead_count += 1;
        }
    }

    fn set_name_at(&self, now_ms: u64, uid: u64, name: String) {
        if !self.gate_entry(now_ms, false, None) {
            return;
        }
        self.record_activity(now_ms);
        self.users.write().entry(uid).or_insert_with(UserData::new).name = name.clone();
        self.touch_identity(uid, |entry| entry.name = Some(name));
    }

    fn set_profession_at(&self, now_ms: u64, uid: u64, profession: String) {
        if !self.gate_entry(now_ms, false, None) {
            return;
        }
        self.record_activity(now_ms);
        self.users.write().entry(uid).or_insert_with(UserData::new).set_profession(profession.clone());
        self.touch_identity(uid, |entry| entry.profession = Some(profession));
    }

    fn set_fight_point_at(&self, now_ms: u64, uid: u64, fight_point: i64) {
        if !self.gate_entry(now_ms, false, None) {
            return;
        }
        self.record_activity(now_ms);
        self.users.write().entry(uid).or_insert_with(UserData::new).fight_point = fight_point;
        self.touch_identity(uid, |entry| entry.fight_point = Some(fight_point));
    }

    fn set_attr_kv_at(&self, now_ms: u64, uid: u64, key: String, value: i64) {
        if !self.gate_entry(now_ms, false, None) {
            return;
        }
        self.record_activity(now_ms);
        if key == "hp" {
            self.hp_cache.write().insert(uid, value);
        }
        let max_hp_update = key == "max_hp";
        self.users.write().entry(uid).or_insert_with(UserData::new).attr.insert(key, value);
        if max_hp_update {
            self.touch_identity(uid, |entry| entry.max_hp = Some(value));
        }
    }

    fn add_log_at(&self, now_ms: u64, line: String) {
        if !self.gate_entry(now_ms, false, None) {
            return;
        }
        self.record_activity(now_ms);
        if let Err(err) = self.fight_log.append(now_ms, &line) {
            tracing::error!(%err, "fight log append failed");
        }
    }

    fn upsert_enemy_at(
        &self,
        now_ms: u64,
        enemy_id: u64,
        name: Option<String>,
        hp: Option<i64>,
        max_hp: Option<i64>,
    ) {
        if !self.gate_entry(now_ms, false, None) {
            return;
        }
        self.record_activity(now_ms);
        let mut enemies = self.enemy_cache.write();
        let entry = enemies.entry(enemy_id).or_default();
        if let Some(name) = name {
            entry.name = Some(name);
        }
        if let Some(hp) = hp {
            entry.hp = hp;
        }
        if let Some(max_hp) = max_hp {
            entry.max_hp = max_hp;
        }
    }

    fn remove_enemy_at(&self, now_ms: u64, enemy_id: u64) {
        if !self.gate_entry(now_ms, false, None) {
            return;
        }
        self.record_activity(now_ms);
        self.enemy_cache.write().remove(&enemy_id);
    }
}

impl EventSink for UserDataManager {
    fn add_damage(&self, record: DamageRecord) {
        self.add_damage_at(now_ms(), record);
    }

    fn add_healing(&self, record: HealingRecord) {
        self.add_healing_at(now_ms(), record);
    }

    fn add_taken_damage(&self, uid: u64, damage: i64, is_dead: bool) {
        self.add_taken_damage_at(now_ms(), uid, damage, is_dead);
    }

    fn set_name(&self, uid: u64, name: String) {
        self.set_name_at(now_ms(), uid, name);
    }

    fn set_profession(&self, uid: u64, profession: String) {
        self.set_profession_at(now_ms(), uid, profession);
    }

    fn set_fight_point(&self, uid: u64, fight_point: i64) {
        self.set_fight_point_at(now_ms(), uid, fight_point);
    }

    fn set_attr_kv(&self, uid: u64, key: String, value: i64) {
        self.set_attr_kv_at(now_ms(), uid, key, value);
    }

    fn add_log(&self, line: String) {
        self.add_log_at(now_ms(), line);
    }

    fn upsert_enemy(&self, enemy_id: u64, name: Option<String>, hp: Option<i64>, max_hp: Option<i64>) {
        self.upsert_enemy_at(now_ms(), enemy_id, name, hp, max_hp);
    }

    fn remove_enemy(&self, enemy_id: u64) {
        self.remove_enemy_at(now_ms(), enemy_id);
    }
}
