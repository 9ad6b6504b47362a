pub mod json_repository;
pub mod model;

pub use json_repository::{JsonSettingsRepository, SettingsError, SettingsRepository};
pub use model::SettingsModel;
