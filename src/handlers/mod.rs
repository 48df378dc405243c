// src/handlers/mod.rs

pub mod auth;
pub mod course;
pub mod dashboard;
pub mod lesson;
pub mod payment;
pub mod progress;
pub mod quiz;
