// src/services/mod.rs

pub mod course_lock;
pub mod enrollment;
pub mod progress;
pub mod quiz;
pub mod reconcile;
pub mod rewards;
