//! Pipeline stages for receipt extraction.
//!
//! Each submodule implements exactly one transformation step so each can be
//! tested on its own and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! image ──▶ llm ──▶ normalize ──▶ mapper ──▶ (sink)
//! (decode)  (VLM)   (JSON+defaults) (row)
//! ```
//!
//! 1. [`image`]     — resolve path/stdin/URL, decode JPEG/PNG, cap size, base64
//! 2. [`llm`]       — one call to the vision model; the only stage with
//!    model network I/O
//! 3. [`normalize`] — strip fences, parse JSON, apply field defaults
//! 4. [`mapper`]    — order the record's fields into the sheet's columns

pub mod image;
pub mod llm;
pub mod mapper;
pub mod normalize;
