//! HTTP handlers

pub mod account;
pub mod assist;
pub mod auth;
pub mod billing;
pub mod documents;
pub mod health;
pub mod pages;
pub mod texts;
pub mod webhook;
