//! `UserData`: one observed player, owning top-level damage/healing
//! aggregates plus a per-skill breakdown (root spec §3).

use std::collections::HashMap;

use meter_proto::{SkillKey, StatKind};

use crate::statistic_data::StatisticData;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SkillSlot {
    pub kind: StatKind,
    pub skill: SkillKey,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct UserData {
    pub name: String,
    pub profession: String,
    pub sub_profession: String,
    pub fight_point: i64,
    pub taken_damage: u64,
    pub dead_count: u64,
    pub attr: HashMap<String, i64>,

    pub damage_stats: StatisticData,
    pub healing_stats: StatisticData,

    #[serde(skip)]
    pub skill_usage: HashMap<SkillSlot, StatisticData>,
}

impl UserData {
    #[must_use]
    pub fn new() -> Self {
        Self {
            damage_stats: StatisticData::new("damage"),
            healing_stats: StatisticData::new("healing"),
            ..Self::default()
        }
    }

    /// Root spec §3: "Setting `profession` to a new value resets
    /// `subProfession` to empty."
    pub fn set_profession(&mut self, profession: impl Into<String>) {
        let profession = profession.into();
        if profession != self.profession {
            self.sub_profession.clear();
        }
        self.profession = profession;
    }

    /// Returns the skill sub-aggregate for `(kind, skill)`, creating it on
    /// first use. Skill sub-aggregates never accumulate a realtime window
    /// (root spec §3/§4.8: "The sub-aggregates only retain aggregate
    /// stats ... cleared on every add"), so `update_realtime_stats` is
    /// simply never called on these, and any window entries pushed by
    /// `add_record` are dropped immediately after.
    pub fn skill_stat_mut(&mut self, kind: StatKind, skill: SkillKey) -> &mut StatisticData {
        let slot = SkillSlot { kind, skill: skill.clone() };
        self.skill_usage.entry(slot).or_insert_with(|| {
            let mut data = StatisticData::new(match kind {
                StatKind::Damage => "damage",
                StatKind::Healing => "healing",
            });
            data.name = skill.to_string();
            data
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_profession_resets_sub_profession() {
        let mut u = UserData::new();
        u.set_profession("Marksman");
        u.sub_profession = "Frostbeam".into();
        u.set_profession("Marksman"); // same value: unchanged
        assert_eq!(u.sub_profession, "Frostbeam");
        u.set_profession("Cleric");
        assert_eq!(u.sub_profession, "");
    }

    #[test]
    fn skill_stat_is_created_lazily_and_reused() {
        let mut u = UserData::new();
        u.skill_stat_mut(StatKind::Damage, SkillKey::Id(1241))
            .add_record(0, 100, false, false, 100);
        u.skill_stat_mut(StatKind::Damage, SkillKey::Id(1241))
            .add_record(1, 50, false, false, 50);
        let stat = u.skill_usage.get(&SkillSlot { kind: StatKind::Damage, skill: SkillKey::Id(1241) }).unwrap();
        assert_eq!(stat.totals.total, 150);
    }
}
