//! Domain enums and API view models
//!
//! Enum values are stored as upper-case text columns and serialized with the
//! same spelling, so `RequestStatus::Approved` is `"APPROVED"` both in SQLite
//! and on the wire. The schema CHECK constraints in `db.rs` list the same values.

use crate::db::Pet;
use serde::{Deserialize, Serialize};

/// Implements `as_str`, `FromStr` and `Display` for a text-backed enum.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("invalid {} '{}'", stringify!($name), other)),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// =============================================================================
// Lineage
// =============================================================================

/// Which parent slot a lineage edge fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "ts-rs", derive(ts_rs::TS))]
pub enum Role {
    Father,
    Mother,
}

text_enum!(Role { Father => "FATHER", Mother => "MOTHER" });

/// Parent request lifecycle.
///
/// PENDING → {APPROVED, REJECTED, CANCELLED}; any non-DELETED state → DELETED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "ts-rs", derive(ts_rs::TS))]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Deleted,
}

text_enum!(RequestStatus {
    Pending => "PENDING",
    Approved => "APPROVED",
    Rejected => "REJECTED",
    Cancelled => "CANCELLED",
    Deleted => "DELETED",
});

impl RequestStatus {
    /// Whether a request in this status may move to `next`
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        match (self, next) {
            (RequestStatus::Pending, RequestStatus::Approved)
            | (RequestStatus::Pending, RequestStatus::Rejected)
            | (RequestStatus::Pending, RequestStatus::Cancelled) => true,
            (RequestStatus::Deleted, _) => false,
            (_, RequestStatus::Deleted) => true,
            _ => false,
        }
    }
}

/// Why a record is replaced by a stub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "ts-rs", derive(ts_rs::TS))]
pub enum HiddenStatus {
    Secret,
    Deleted,
    Pending,
}

text_enum!(HiddenStatus { Secret => "SECRET", Deleted => "DELETED", Pending => "PENDING" });

// =============================================================================
// Pets and breeding
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "ts-rs", derive(ts_rs::TS))]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

text_enum!(Sex { Male => "MALE", Female => "FEMALE", Unknown => "UNKNOWN" });

impl Sex {
    /// Whether a pet of this sex may fill the given parent slot
    pub fn fits(self, role: Role) -> bool {
        !matches!(
            (self, role),
            (Sex::Female, Role::Father) | (Sex::Male, Role::Mother)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "ts-rs", derive(ts_rs::TS))]
pub enum AdoptionStatus {
    Nfs,
    OnSale,
    OnReservation,
    Sold,
}

text_enum!(AdoptionStatus {
    Nfs => "NFS",
    OnSale => "ON_SALE",
    OnReservation => "ON_RESERVATION",
    Sold => "SOLD",
});

impl AdoptionStatus {
    /// A buyer may only be recorded once the pet is reserved or sold
    pub fn allows_buyer(self) -> bool {
        matches!(self, AdoptionStatus::OnReservation | AdoptionStatus::Sold)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "ts-rs", derive(ts_rs::TS))]
pub enum NotificationType {
    ParentRequest,
    ParentApproved,
    ParentRejected,
    ParentCancelled,
    AdoptionSold,
}

text_enum!(NotificationType {
    ParentRequest => "PARENT_REQUEST",
    ParentApproved => "PARENT_APPROVED",
    ParentRejected => "PARENT_REJECTED",
    ParentCancelled => "PARENT_CANCELLED",
    AdoptionSold => "ADOPTION_SOLD",
});

// =============================================================================
// Views
// =============================================================================

/// Client-facing pet record with tag sets decoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts-rs", derive(ts_rs::TS))]
pub struct PetView {
    pub pet_id: i32,
    pub owner_id: Option<String>,
    pub name: String,
    pub species: String,
    pub sex: String,
    pub morphs: Vec<String>,
    pub traits: Vec<String>,
    pub hatching_date: Option<String>,
    pub weight: Option<f64>,
    pub laying_id: Option<i32>,
    pub is_public: bool,
    pub is_deleted: bool,
}

impl From<&Pet> for PetView {
    fn from(pet: &Pet) -> Self {
        Self {
            pet_id: pet.id,
            owner_id: pet.owner_id.clone(),
            name: pet.name.clone(),
            species: pet.species.clone(),
            sex: pet.sex.clone(),
            morphs: decode_tags(&pet.morphs_json),
            traits: decode_tags(&pet.traits_json),
            hatching_date: pet.hatching_date.clone(),
            weight: pet.weight,
            laying_id: pet.laying_id,
            is_public: pet.is_public,
            is_deleted: pet.is_deleted,
        }
    }
}

/// Decode a JSON tag array column; malformed values read as empty
pub fn decode_tags(json: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_default()
}

/// Encode tags as a JSON array, trimmed, deduplicated and sorted
pub fn encode_tags(tags: &[String]) -> String {
    let mut cleaned: Vec<&str> = tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    cleaned.sort_unstable();
    cleaned.dedup();
    serde_json::to_string(&cleaned).unwrap_or_else(|_| "[]".to_string())
}

/// Redacted stand-in: exposes only the id and the reason it is hidden
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts-rs", derive(ts_rs::TS))]
pub struct PetStub {
    pub pet_id: i32,
    pub hidden_status: HiddenStatus,
}

/// Outcome of the visibility filter.
///
/// Serializes as the record itself, as a `{petId, hiddenStatus}` stub, or as
/// `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Visible<T> {
    Full(T),
    Hidden(PetStub),
    Absent,
}

impl<T> Visible<T> {
    pub fn hidden(pet_id: i32, hidden_status: HiddenStatus) -> Self {
        Visible::Hidden(PetStub { pet_id, hidden_status })
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Visible::Absent)
    }

    pub fn full(&self) -> Option<&T> {
        match self {
            Visible::Full(t) => Some(t),
            _ => None,
        }
    }

    pub fn stub(&self) -> Option<&PetStub> {
        match self {
            Visible::Hidden(stub) => Some(stub),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_text_enum_round_trip() {
        for status in RequestStatus::ALL {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), *status);
        }
        assert_eq!("on_sale".parse::<AdoptionStatus>().unwrap(), AdoptionStatus::OnSale);
        assert!("SIRE".parse::<Role>().is_err());
    }

    #[test]
    fn test_serde_matches_column_spelling() {
        assert_eq!(serde_json::to_string(&AdoptionStatus::OnReservation).unwrap(), "\"ON_RESERVATION\"");
        assert_eq!(serde_json::to_string(&AdoptionStatus::Nfs).unwrap(), "\"NFS\"");
        assert_eq!(serde_json::to_string(&HiddenStatus::Secret).unwrap(), "\"SECRET\"");
    }

    #[test]
    fn test_request_transitions() {
        use RequestStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Approved.can_transition_to(Deleted));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Deleted.can_transition_to(Deleted));
        assert!(!Pending.can_transition_to(Pending));
    }

    proptest! {
        #[test]
        fn prop_transitions_stay_in_the_lifecycle(
            from in proptest::sample::select(RequestStatus::ALL.to_vec()),
            to in proptest::sample::select(RequestStatus::ALL.to_vec()),
        ) {
            use RequestStatus::*;
            let forward = from == Pending && matches!(to, Approved | Rejected | Cancelled);
            let deletion = from != Deleted && to == Deleted;
            prop_assert_eq!(from.can_transition_to(to), forward || deletion);
        }
    }

    #[test]
    fn test_sex_fits_role() {
        assert!(Sex::Male.fits(Role::Father));
        assert!(!Sex::Male.fits(Role::Mother));
        assert!(Sex::Unknown.fits(Role::Mother));
    }

    #[test]
    fn test_visible_serialization_shapes() {
        let hidden: Visible<PetView> = Visible::hidden(4, HiddenStatus::Secret);
        assert_eq!(
            serde_json::to_string(&hidden).unwrap(),
            r#"{"petId":4,"hiddenStatus":"SECRET"}"#
        );
        let absent: Visible<PetView> = Visible::Absent;
        assert_eq!(serde_json::to_string(&absent).unwrap(), "null");
    }

    #[test]
    fn test_encode_tags_normalizes() {
        let tags = vec![" tangerine".to_string(), "albino".to_string(), "tangerine".to_string(), "".to_string()];
        assert_eq!(encode_tags(&tags), r#"["albino","tangerine"]"#);
        assert_eq!(decode_tags("not json"), Vec::<String>::new());
    }
}
