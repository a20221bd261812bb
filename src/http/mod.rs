//! HTTP message handling.
//!
//! # Architecture
//!
//! The HTTP layer is organized into several submodules:
//!
//! - **`uri`**: URL validation, IDNA host encoding and normalization
//! - **`headers`**: Case-insensitive header set and header value validation
//! - **`body`**: Form encoding, request data and stream bodies
//! - **`multipart`**: `multipart/form-data` encoding for file uploads
//! - **`request`**: The request description and the preparation pipeline
//! - **`auth`**, **`cookies`**, **`hooks`**: Collaborator seams used while preparing
//! - **`raw`**: Blocking and async body sources handed over by a transport
//! - **`content`**: The body state machine and text/JSON decoding
//! - **`lines`**: Line splitting and incremental decoding over chunk sources
//! - **`response`**: Responses with byte, text, line and JSON views
//! - **`parser`** / **`writer`**: HTTP/1.1 response head parsing and request serialization
//!
//! # Preparation Pipeline
//!
//! ```text
//!   method ─▶ url ─▶ headers ─▶ cookies ─▶ body + length ─▶ auth ─▶ hooks
//! ```
//!
//! # Body State Machine
//!
//! ```text
//!        ┌────────────┐
//!        │   Unread   │
//!        └─────┬──────┘
//!   iter_content│        content()
//!              ▼              │
//!        ┌────────────┐       ▼
//!        │ Streaming  │   ┌──────────────┐
//!        └─────┬──────┘   │ Materialized │ ← replayed on every later read
//!              │          └──────────────┘
//!              ├─ end of body → Consumed
//!              └─ transport error → Failed
//! ```
//!
//! # Example
//!
//! ```
//! use missive::http::raw::Raw;
//! use missive::http::request::RequestSpec;
//! use missive::http::response::ResponseBuilder;
//!
//! let prepared = RequestSpec::new("get", "http://example.com/items")
//!     .params("page=2")
//!     .prepare()
//!     .unwrap();
//! assert_eq!(prepared.url(), "http://example.com/items?page=2");
//!
//! let mut response = ResponseBuilder::new(200)
//!     .header("Content-Type", "application/json")
//!     .raw(Raw::from_chunks([r#"{"items": "#, "[1, 2]}"]))
//!     .request(prepared)
//!     .build();
//! let body: serde_json::Value = response.json().unwrap();
//! assert_eq!(body["items"][1], 2);
//! ```

pub mod auth;
pub mod body;
pub mod content;
pub mod cookies;
pub mod headers;
pub mod hooks;
pub mod lines;
pub mod multipart;
pub mod parser;
pub mod raw;
pub mod request;
pub mod response;
pub mod uri;
pub mod writer;
