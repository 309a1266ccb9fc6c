//! Breeder's Room - pet lineage, breeding records and adoption listings
//!
//! Keepers register pets, propose and approve parentage, record pairs,
//! matings and clutches, and list pets for adoption. Lineage reads go through
//! a visibility filter so private bloodlines show up only as stubs.
//!
//! # Lineage
//!
//! | Piece | Purpose |
//! |-------|---------|
//! | parent request | proposed father/mother edge, approved by the counterpart |
//! | pet relation | materialized father/mother pointers, one row per pet |
//! | visibility | full record, `{petId, hiddenStatus}` stub, or nothing |
//!
//! # Quick Start
//!
//! ```no_run
//! use breeders_room::{ApproverPolicy, Database, Service};
//! use breeders_room::parent_request::ProposeInput;
//! use breeders_room::pets::PetInput;
//! use breeders_room::types::{Role, Sex};
//!
//! let db = Database::new("breeders-room.db").unwrap();
//! let service = Service::new(db, ApproverPolicy::Counterpart);
//!
//! let sire = PetInput { name: "Gecko-1".into(), species: "leopard gecko".into(), sex: Some(Sex::Male), ..Default::default() };
//! let kid = PetInput { name: "Gecko-2".into(), species: "leopard gecko".into(), ..Default::default() };
//! let sire = service.create_pet("alice", &sire).unwrap();
//! let kid = service.create_pet("bob", &kid).unwrap();
//!
//! // alice proposes, bob (the child's owner) approves
//! let request = service
//!     .propose("alice", &ProposeInput { child_pet_id: kid.id, parent_pet_id: sire.id, role: Role::Father, message: None })
//!     .unwrap();
//! service.approve(request.id, "bob").unwrap();
//!
//! let parents = service.get_parents_with_request_status(kid.id, None).unwrap();
//! assert!(parents.father.parent.full().is_some());
//! ```

pub mod adoption;
pub mod breeding;
pub mod config;
pub mod db;
pub mod error;
pub mod init;
pub mod lineage;
pub mod notify;
pub mod observability;
pub mod parent_request;
pub mod pets;
pub mod relation;
pub mod schema;
pub mod serve;
pub mod service;
pub mod types;
pub mod visibility;

pub use config::{ApproverPolicy, Config};
pub use db::{Adoption, Database, Laying, Mating, Pair, ParentRequest, Pet, PetRelation, CURRENT_SCHEMA};
pub use error::{AppError, DbError};
pub use lineage::{FamilyTree, ParentsView, PetDetail, SiblingsView};
pub use notify::{Notice, NotificationSink};
pub use service::Service;
pub use types::{HiddenStatus, PetStub, PetView, Visible};

// Re-export TS trait for downstream use
#[cfg(feature = "ts-rs")]
pub use ts_rs::TS;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify core types are re-exported from crate root
        let _ = CURRENT_SCHEMA;
        let _ = ApproverPolicy::default();
    }
}
