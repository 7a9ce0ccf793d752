//! Library exports for the listings marketplace service
//!
//! This module exposes internal components for testing and potential library usage.

pub mod auth;
pub mod blob;
pub mod clock;
pub mod config;
pub mod contact;
pub mod database;
pub mod error;
pub mod geo;
pub mod handler;
pub mod model;
pub mod rating;
pub mod requirement;
pub mod route;
pub mod search;
pub mod store;
