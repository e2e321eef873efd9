//! The statistics engine: C8 through C10 of the root spec. Owns every
//! piece of process-wide mutable state ([`manager::UserDataManager`]) and
//! everything that state persists to disk (identity cache, settings,
//! per-session history).
//!
//! [`manager::UserDataManager`] implements [`meter_proto::EventSink`] and
//! is the only thing downstream consumers (the frame decoder, the HTTP/WS
//! surface, the lifecycle control flow) ever touch directly.

pub mod cache;
pub mod manager;
pub mod persistence;
pub mod settings;
pub mod statistic_data;
pub mod subprofession;
pub mod user_data;

pub use manager::{DataSnapshot, EnemyInfo, UserDataManager, UserSnapshot};
pub use settings::Settings;
