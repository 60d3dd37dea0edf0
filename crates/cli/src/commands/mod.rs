pub mod drain;
pub mod readiness;
pub mod templates;
