// src/payments/mod.rs

pub mod provider;
pub mod stripe;
pub mod webhook;
