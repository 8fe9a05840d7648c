//! # Deckhub Permissions
//!
//! Authentication and authorization for catalog sync.
//!
//! ## Overview
//!
//! Access is expressed as grants relating a subject to a collection. Every
//! request goes through one decision point, [`check_access`], before any
//! sync component runs.
//!
//! ## Key Concepts
//!
//! - **Identity**: turns a bearer credential into a [`SubjectId`]
//! - **Entitlement**: supplies the subject's [`AccessGrant`]s
//! - **Relation**: Owner, Maintainer, Subscriber or Reader
//! - **Resource**: a collection, one of its overlays, or its maintenance
//!
//! ## Access Model
//!
//! | Resource      | Allowed relations                  |
//! |---------------|------------------------------------|
//! | Collection    | any                                |
//! | Overlay       | Owner, Maintainer, Subscriber      |
//! | Maintenance   | Owner, Maintainer                  |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use deckhub_core::{CollectionId, SubjectId};
//! use deckhub_perms::{check_access, AccessGrant, Relation, Resource};
//!
//! let subject = SubjectId::new("alice");
//! let collection = CollectionId::new();
//! let grants = vec![AccessGrant::new(subject.clone(), collection, Relation::Reader)];
//!
//! let decision = check_access(&subject, &Resource::Collection(collection), &grants, 0);
//! assert!(decision.is_allowed());
//! ```
//!
//! [`SubjectId`]: deckhub_core::SubjectId

pub mod access;
pub mod entitlement;
pub mod error;
pub mod grant;
pub mod identity;
pub mod state;

pub use access::{check_access, AccessDecision, Resource};
pub use entitlement::{Entitlement, MemoryEntitlements};
pub use error::{AccessError, Result};
pub use grant::{AccessGrant, Relation};
pub use identity::{Identity, StaticIdentity};
pub use state::GrantSet;
