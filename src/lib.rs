//! Missive - HTTP request preparation and response body handling
//!
//! Core library for turning request descriptions into wire-ready messages
//! and for consuming response bodies as bytes, text, lines or JSON.

pub mod config;
pub mod error;
pub mod http;

pub use error::{Error, HttpError, Result};
pub use http::request::{Method, PreparedMessage, RequestSpec};
pub use http::response::{AsyncResponseMessage, ResponseBuilder, ResponseMessage};
