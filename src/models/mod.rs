// src/models/mod.rs

pub mod answer;
pub mod event;
pub mod leaderboard;
pub mod participant;
pub mod question;
pub mod quiz;
