// src/handlers/mod.rs

pub mod host;
pub mod participant;
pub mod quiz;
pub mod ws;
