//! Visibility filter for lineage reads
//!
//! Decides, for a viewer, whether a pet is returned in full, replaced by a
//! `{petId, hiddenStatus}` stub, or omitted. A stub leaks only existence and
//! the reason; never names, morphs, traits or weight.
//!
//! Precedence for a parent seen through a child's lineage:
//!
//! 1. no subject: absent
//! 2. deleted: full for its owner, `DELETED` stub for everyone else
//! 3. viewer owns child and parent: full
//! 4. viewer owns child only: private parent is a `PENDING` stub while the
//!    request is pending, a `SECRET` stub otherwise; public parent is full
//! 5. viewer does not own child: only APPROVED edges are visible; private
//!    parents not owned by the viewer become `SECRET` stubs

use crate::db::Pet;
use crate::types::{HiddenStatus, PetView, RequestStatus, Visible};

/// Filter a parent pet reached through `child`'s lineage.
///
/// `status` is the status of the request backing the edge. `None` means the
/// pointer exists without a request row, which only the materializer can
/// produce on approval, so it counts as approved.
pub fn filter_parent(
    parent: Option<&Pet>,
    child: &Pet,
    viewer: Option<&str>,
    status: Option<RequestStatus>,
) -> Visible<PetView> {
    let Some(parent) = parent else {
        return Visible::Absent;
    };

    let owns_parent = parent.is_owned_by(viewer);
    if parent.is_deleted {
        return if owns_parent {
            Visible::Full(PetView::from(parent))
        } else {
            Visible::hidden(parent.id, HiddenStatus::Deleted)
        };
    }

    if child.is_owned_by(viewer) {
        if owns_parent || parent.is_public {
            return Visible::Full(PetView::from(parent));
        }
        return match status {
            Some(RequestStatus::Pending) => Visible::hidden(parent.id, HiddenStatus::Pending),
            _ => Visible::hidden(parent.id, HiddenStatus::Secret),
        };
    }

    let approved = matches!(status, None | Some(RequestStatus::Approved));
    if !approved {
        return Visible::Absent;
    }
    if !parent.is_public && !owns_parent {
        return Visible::hidden(parent.id, HiddenStatus::Secret);
    }
    Visible::Full(PetView::from(parent))
}

/// Filter a pet shown in a listing: siblings, family tree nodes, pet lists
pub fn filter_listed(pet: Option<&Pet>, viewer: Option<&str>) -> Visible<PetView> {
    let Some(pet) = pet else {
        return Visible::Absent;
    };
    let owns = pet.is_owned_by(viewer);
    if owns {
        return Visible::Full(PetView::from(pet));
    }
    if pet.is_deleted {
        return Visible::hidden(pet.id, HiddenStatus::Deleted);
    }
    if !pet.is_public {
        return Visible::hidden(pet.id, HiddenStatus::Secret);
    }
    Visible::Full(PetView::from(pet))
}

/// Filter a pet requested directly by id.
///
/// Private pets are omitted rather than stubbed so a direct lookup cannot be
/// used to probe for their existence.
pub fn filter_detail(pet: &Pet, viewer: Option<&str>) -> Visible<PetView> {
    if pet.is_owned_by(viewer) {
        return Visible::Full(PetView::from(pet));
    }
    if pet.is_deleted {
        return Visible::hidden(pet.id, HiddenStatus::Deleted);
    }
    if !pet.is_public {
        return Visible::Absent;
    }
    Visible::Full(PetView::from(pet))
}

/// Whether `viewer` may read lineage data hanging off `pet` at all
pub fn can_view_lineage(pet: &Pet, viewer: Option<&str>) -> bool {
    pet.is_owned_by(viewer) || (pet.is_public && !pet.is_deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pet(id: i32, owner: Option<&str>, is_public: bool, is_deleted: bool) -> Pet {
        Pet {
            id,
            owner_id: owner.map(str::to_string),
            name: format!("pet-{}", id),
            species: "leopard gecko".to_string(),
            sex: "FEMALE".to_string(),
            morphs_json: r#"["tremper albino"]"#.to_string(),
            traits_json: "[]".to_string(),
            hatching_date: Some("2023-06-01".to_string()),
            weight: Some(62.0),
            laying_id: None,
            is_public,
            is_deleted,
            deleted_at: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_owner_of_both_sees_private_parent() {
        let child = pet(1, Some("a"), false, false);
        let parent = pet(2, Some("a"), false, false);
        let v = filter_parent(Some(&parent), &child, Some("a"), Some(RequestStatus::Approved));
        assert_eq!(v.full().map(|p| p.pet_id), Some(2));
    }

    #[test]
    fn test_child_owner_gets_secret_for_foreign_private_parent() {
        let child = pet(1, Some("a"), true, false);
        let parent = pet(2, Some("b"), false, false);
        let v = filter_parent(Some(&parent), &child, Some("a"), Some(RequestStatus::Approved));
        assert_eq!(v.stub().map(|s| s.hidden_status), Some(HiddenStatus::Secret));

        let pending = filter_parent(Some(&parent), &child, Some("a"), Some(RequestStatus::Pending));
        assert_eq!(pending.stub().map(|s| s.hidden_status), Some(HiddenStatus::Pending));
    }

    #[test]
    fn test_child_owner_sees_pending_public_parent() {
        let child = pet(1, Some("a"), true, false);
        let parent = pet(2, Some("b"), true, false);
        let v = filter_parent(Some(&parent), &child, Some("a"), Some(RequestStatus::Pending));
        assert!(v.full().is_some());
    }

    #[test]
    fn test_stranger_sees_nothing_for_unapproved_edge() {
        let child = pet(1, Some("a"), true, false);
        let parent = pet(2, Some("b"), true, false);
        for status in [RequestStatus::Pending, RequestStatus::Rejected, RequestStatus::Cancelled, RequestStatus::Deleted] {
            assert!(filter_parent(Some(&parent), &child, Some("c"), Some(status)).is_absent());
        }
        assert!(filter_parent(Some(&parent), &child, None, None).full().is_some());
    }

    #[test]
    fn test_deleted_parent_overrides_status() {
        let child = pet(1, Some("a"), true, false);
        let parent = pet(2, Some("b"), true, true);
        let v = filter_parent(Some(&parent), &child, Some("c"), Some(RequestStatus::Deleted));
        assert_eq!(v.stub().map(|s| s.hidden_status), Some(HiddenStatus::Deleted));

        let own = filter_parent(Some(&parent), &child, Some("b"), Some(RequestStatus::Deleted));
        assert!(own.full().map(|p| p.is_deleted).unwrap_or(false));
    }

    #[test]
    fn test_listing_policy() {
        let private = pet(5, Some("b"), false, false);
        assert_eq!(filter_listed(Some(&private), Some("a")).stub().map(|s| s.hidden_status), Some(HiddenStatus::Secret));
        assert!(filter_listed(Some(&private), Some("b")).full().is_some());
        assert!(filter_listed(None, Some("b")).is_absent());
    }

    #[test]
    fn test_detail_omits_private() {
        let private = pet(5, Some("b"), false, false);
        assert!(filter_detail(&private, Some("a")).is_absent());
        assert!(filter_detail(&private, None).is_absent());
        assert!(filter_detail(&private, Some("b")).full().is_some());
        assert!(!can_view_lineage(&private, Some("a")));
        assert!(can_view_lineage(&private, Some("b")));
    }

    fn status_strategy() -> impl Strategy<Value = Option<RequestStatus>> {
        prop_oneof![
            Just(None),
            proptest::sample::select(RequestStatus::ALL.to_vec()).prop_map(Some),
        ]
    }

    fn user_strategy() -> impl Strategy<Value = Option<String>> {
        proptest::option::of(prop_oneof![Just("a".to_string()), Just("b".to_string()), Just("c".to_string())])
    }

    proptest! {
        #[test]
        fn prop_private_parent_never_leaks_to_non_owner(
            parent_owner in user_strategy(),
            child_owner in user_strategy(),
            viewer in user_strategy(),
            status in status_strategy(),
            deleted in any::<bool>(),
        ) {
            let child = pet(1, child_owner.as_deref(), true, false);
            let parent = pet(2, parent_owner.as_deref(), false, deleted);
            let v = filter_parent(Some(&parent), &child, viewer.as_deref(), status);
            if !parent.is_owned_by(viewer.as_deref()) {
                prop_assert!(v.full().is_none());
            }
        }

        #[test]
        fn prop_deleted_pets_are_stubbed_for_non_owners(
            owner in user_strategy(),
            viewer in user_strategy(),
            is_public in any::<bool>(),
            status in status_strategy(),
        ) {
            let child = pet(1, Some("a"), true, false);
            let parent = pet(2, owner.as_deref(), is_public, true);
            prop_assume!(!parent.is_owned_by(viewer.as_deref()));

            let v = filter_parent(Some(&parent), &child, viewer.as_deref(), status);
            prop_assert_eq!(v.stub().map(|s| s.hidden_status), Some(HiddenStatus::Deleted));
            let listed = filter_listed(Some(&parent), viewer.as_deref());
            prop_assert_eq!(listed.stub().map(|s| s.hidden_status), Some(HiddenStatus::Deleted));
        }

        #[test]
        fn prop_stranger_sees_only_approved_edges(
            is_public in any::<bool>(),
            status in status_strategy(),
        ) {
            let child = pet(1, Some("a"), true, false);
            let parent = pet(2, Some("b"), is_public, false);
            let v = filter_parent(Some(&parent), &child, Some("c"), status);
            let approved = matches!(status, None | Some(RequestStatus::Approved));
            prop_assert_eq!(v.is_absent(), !approved);
        }
    }
}
