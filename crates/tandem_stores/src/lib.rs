//! # Tandem Stores
//!
//! Store adapters for tandem.
//!
//! This crate provides:
//! - The `StoreAdapter` contract shared by both stores
//! - `PrimaryStore`, a paginated adapter over a PostgREST-style table API
//! - `SecondaryStore`, a cursor-paginated adapter over a page database API
//! - `SchemaMapping`, the declarative field table used by the page adapter
//! - `RetryPolicy`, exponential backoff with jitter for every network call
//! - `MemoryStore`, an in-process adapter with failure injection
//!
//! ## Key Invariants
//!
//! - A fetch either returns every page or fails; partial fetches are errors
//! - Items that cannot be translated are reported, never silently dropped
//! - Non-idempotent creates are only retried when the store rejected them

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod error;
mod http;
mod mapping;
mod memory;
mod primary;
mod retry;
mod secondary;

pub use adapter::{Fetched, StoreAdapter};
pub use error::{StoreError, StoreResult, TranslationError};
pub use http::{
    HttpClient, HttpRequest, HttpResponse, Method, ReqwestClient, Scripted, ScriptedClient,
};
pub use mapping::{LogicalField, PropertyKind, PropertyMapping, SchemaMapping};
pub use memory::{CallCounts, MemoryStore};
pub use primary::{record_to_row, row_to_record, PrimaryConfig, PrimaryStore};
pub use retry::RetryPolicy;
pub use secondary::{SecondaryConfig, SecondaryStore, MAX_PAGE_SIZE};
