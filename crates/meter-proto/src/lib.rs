//! The narrow capability interface the (external, out-of-scope) event decoder
//! calls into. See the design note in the root spec: "duck-typed event
//! decoder ... expose a narrow capability interface so the decoder can be
//! tested against a mock."
//!
//! Nothing in this crate parses game packets. It only defines the shapes
//! that cross the C7/C8 boundary.

use std::fmt;

/// Identifies a skill sub-aggregate under a user. Skills are sometimes
/// reported by the decoder as a numeric id and sometimes only as a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum SkillKey {
    Id(u32),
    Name(String),
}

impl fmt::Display for SkillKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

/// The two top-level statistic kinds a user accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum StatKind {
    Damage,
    Healing,
}

/// One damage record as reported by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct DamageRecord {
    pub uid: u64,
    pub skill: SkillKey,
    pub element: String,
    pub damage: i64,
    pub is_crit: bool,
    pub is_lucky: bool,
    pub is_cause_lucky: bool,
    pub hp_lessen: i64,
    pub target_uid: u64,
}

/// One healing record as reported by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct HealingRecord {
    pub uid: u64,
    pub skill: SkillKey,
    pub element: String,
    pub healing: i64,
    pub is_crit: bool,
    pub is_lucky: bool,
    pub is_cause_lucky: bool,
    pub target_uid: u64,
}

/// The capability surface the statistics engine exposes to the event
/// decoder. Implemented by `meter_stats::UserDataManager`; tests exercise a
/// mock implementation instead of any real protocol parsing.
pub trait EventSink: Send + Sync {
    fn add_damage(&self, record: DamageRecord);
    fn add_healing(&self, record: HealingRecord);
    fn add_taken_damage(&self, uid: u64, damage: i64, is_dead: bool);

    fn set_name(&self, uid: u64, name: String);
    fn set_profession(&self, uid: u64, profession: String);
    fn set_fight_point(&self, uid: u64, fight_point: i64);
    fn set_attr_kv(&self, uid: u64, key: String, value: i64);

    fn add_log(&self, line: String);

    fn upsert_enemy(&self, enemy_id: u64, name: Option<String>, hp: Option<i64>, max_hp: Option<i64>);
    fn remove_enemy(&self, enemy_id: u64);
}

/// One fully-framed application message, as produced by the frame splitter
/// (C6) and handed to whatever decoder is wired in. The decoder is out of
/// scope for this crate; this type only describes the boundary.
#[derive(Debug, Clone)]
pub struct ApplicationFrame {
    pub payload: bytes::Bytes,
}

/// The frame -> event decoder contract. A real implementation would inspect
/// `ApplicationFrame::payload` (optionally zstd-decompressed, per the root
/// spec's "payloads are assumed to be observable, possibly compressed with a
/// standard streaming compressor, handled inside the decoder collaborator")
/// and call zero or more methods on an `EventSink`. Kept as a trait so
/// callers can be tested against a mock without a real decoder linked in.
pub trait FrameDecoder: Send {
    fn decode(&mut self, frame: ApplicationFrame, sink: &dyn EventSink);
}

/// A decoder that drops every frame without interpreting it. Used by
/// `meter-app` when no real game-protocol decoder is linked in, so the
/// pipeline from capture through to the stats engine remains exercisable
/// end to end.
#[derive(Debug, Default)]
pub struct NullDecoder;

impl FrameDecoder for NullDecoder {
    fn decode(&mut self, _frame: ApplicationFrame, _sink: &dyn EventSink) {}
}
