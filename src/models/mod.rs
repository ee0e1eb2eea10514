// src/models/mod.rs

pub mod live_session;
pub mod participant;
pub mod question;
pub mod user;
