//! Core of the mushroom find log: typed records over a remote document
//! store, a live per-user subscription, and a two-phase create (photo
//! upload, then record write).

pub mod auth;
pub mod commands;
pub mod config;
pub mod controllers;
pub mod models;
pub mod repository;
