// src/models/mod.rs

pub mod course;
pub mod enrollment;
pub mod lesson;
pub mod payment;
pub mod points;
pub mod progress;
pub mod quiz;
pub mod user;
