//! # Deckhub Testkit
//!
//! Testing utilities for Deckhub.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known inputs and their 85-symbol encodings, for
//!   checking client implementations in other languages
//! - **Generators**: Proptest strategies for drafts, revisions and write
//!   sequences
//! - **Fixtures**: A ready sync service over an in-memory store
//!
//! ## Golden Vectors
//!
//! ```rust
//! use deckhub_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, encoded) in verify_all_vectors() {
//!     assert!(matches, "{}: {}", name, encoded);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use deckhub_testkit::generators::revisions;
//!
//! proptest! {
//!     #[test]
//!     fn sweep_sees_everything(revs in revisions(40), size in 1i64..10) {
//!         // write one note per revision, sweep with `size`, compare
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use deckhub_testkit::fixtures::TestFixture;
//! use deckhub::perms::Relation;
//!
//! let fixture = TestFixture::new().await;
//! let token = fixture.token("alice", Relation::Reader);
//! fixture.note("mitochondria", 1_000).await;
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{TestFixture, NOTE_TYPE};
pub use generators::{entity_draft, revisions, write_ops, WriteOp};
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector};
