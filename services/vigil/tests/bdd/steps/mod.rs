//! BDD step definitions for the vigil service

pub mod acknowledgement_steps;
pub mod alerting_steps;
pub mod virtual_target_steps;
