// src/handlers/mod.rs

pub mod live;
