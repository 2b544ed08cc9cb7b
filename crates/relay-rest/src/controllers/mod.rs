//! HTTP controllers.

pub mod health_controller;
pub mod jobs_controller;
pub mod webhook_controller;
