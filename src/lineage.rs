//! Lineage queries: parents, siblings, family trees
//!
//! Reads combine the materialized relations with the visibility filter. A pet
//! whose lineage the viewer cannot see yields empty results, never an error,
//! so lookups do not reveal more than the pet's own visibility already does.

use crate::db::{find_pet, load_pet, Laying, Mating, Pair, Pet};
use crate::error::Result;
use crate::parent_request::{edge_request, latest_pending};
use crate::relation::{get_relation, get_sibling_pet_ids};
use crate::schema::{layings, matings, pairs, pets};
use crate::service::Service;
use crate::types::{PetView, RequestStatus, Role, Visible};
use crate::visibility::{can_view_lineage, filter_detail, filter_listed, filter_parent};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// One parent slot with the status of the request behind it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentEntry {
    pub parent: Visible<PetView>,
    pub status: Option<RequestStatus>,
    pub request_id: Option<i32>,
}

impl ParentEntry {
    fn absent() -> Self {
        Self {
            parent: Visible::Absent,
            status: None,
            request_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentsView {
    pub pet_id: i32,
    pub father: ParentEntry,
    pub mother: ParentEntry,
}

/// Clutch metadata used to group siblings
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayingInfo {
    pub laying_id: i32,
    pub laying_date: String,
    pub clutch: i32,
    pub mating_id: i32,
    pub mating_date: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiblingEntry {
    pub pet: Visible<PetView>,
    /// Omitted for hidden siblings
    pub laying: Option<LayingInfo>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiblingsView {
    pub pet_id: i32,
    pub father_id: Option<i32>,
    pub mother_id: Option<i32>,
    pub same_clutch: Vec<SiblingEntry>,
    pub other_clutches: Vec<SiblingEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayingNode {
    pub laying_id: i32,
    pub laying_date: String,
    pub clutch: i32,
    pub egg_count: Option<i32>,
    pub hatchlings: Vec<Visible<PetView>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatingNode {
    pub mating_id: i32,
    pub mating_date: String,
    pub layings: Vec<LayingNode>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairNode {
    pub pair_id: i32,
    pub species: String,
    pub father: Visible<PetView>,
    pub mother: Visible<PetView>,
    pub matings: Vec<MatingNode>,
}

/// Pairs → matings → layings → hatchlings for one breeder
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyTree {
    pub owner_id: String,
    pub pairs: Vec<PairNode>,
}

/// A pet looked up directly, with its parents
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PetDetail {
    pub pet: Visible<PetView>,
    pub parents: ParentsView,
}

/// Parents of `child` as seen by `viewer`.
///
/// The materialized pointer decides which pet fills a slot. The child's owner
/// additionally sees the newest pending proposal for an empty slot.
pub(crate) fn parents_for(conn: &mut SqliteConnection, child: &Pet, viewer: Option<&str>) -> QueryResult<ParentsView> {
    let mut view = ParentsView {
        pet_id: child.id,
        father: ParentEntry::absent(),
        mother: ParentEntry::absent(),
    };
    if !can_view_lineage(child, viewer) {
        return Ok(view);
    }

    let relation = get_relation(conn, child.id)?.unwrap_or_default();
    for role in Role::ALL {
        let entry = match relation.parent(*role) {
            Some(parent_id) => {
                let parent = find_pet(conn, parent_id)?;
                let request = edge_request(conn, child.id, parent_id, *role)?;
                let status = request.as_ref().map(|r| r.status());
                ParentEntry {
                    parent: filter_parent(parent.as_ref(), child, viewer, status),
                    status: Some(status.unwrap_or(RequestStatus::Approved)),
                    request_id: request.map(|r| r.id),
                }
            }
            None if child.is_owned_by(viewer) => match latest_pending(conn, child.id, *role)? {
                Some(request) => {
                    let parent = find_pet(conn, request.parent_pet_id)?;
                    ParentEntry {
                        parent: filter_parent(parent.as_ref(), child, viewer, Some(RequestStatus::Pending)),
                        status: Some(RequestStatus::Pending),
                        request_id: Some(request.id),
                    }
                }
                None => ParentEntry::absent(),
            },
            None => ParentEntry::absent(),
        };
        // Nothing about an omitted parent may leak through the status fields
        let entry = if entry.parent.is_absent() { ParentEntry::absent() } else { entry };
        match role {
            Role::Father => view.father = entry,
            Role::Mother => view.mother = entry,
        }
    }
    Ok(view)
}

/// Laying and mating metadata keyed by laying id
fn laying_infos(conn: &mut SqliteConnection, laying_ids: &[i32]) -> QueryResult<HashMap<i32, LayingInfo>> {
    if laying_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let found = layings::table
        .filter(layings::id.eq_any(laying_ids))
        .load::<Laying>(conn)?;
    let mating_ids: Vec<i32> = found.iter().map(|l| l.mating_id).collect();
    let mating_dates: HashMap<i32, String> = matings::table
        .filter(matings::id.eq_any(&mating_ids))
        .select((matings::id, matings::mating_date))
        .load::<(i32, String)>(conn)?
        .into_iter()
        .collect();

    Ok(found
        .into_iter()
        .filter_map(|laying| {
            let mating_date = mating_dates.get(&laying.mating_id)?.clone();
            Some((
                laying.id,
                LayingInfo {
                    laying_id: laying.id,
                    laying_date: laying.laying_date,
                    clutch: laying.clutch,
                    mating_id: laying.mating_id,
                    mating_date,
                },
            ))
        })
        .collect())
}

impl Service {
    /// Father and mother of `pet_id` with request status badges
    pub fn get_parents_with_request_status(&self, pet_id: i32, viewer: Option<&str>) -> Result<ParentsView> {
        self.db().read(|conn| {
            let child = load_pet(conn, pet_id)?;
            Ok(parents_for(conn, &child, viewer)?)
        })
    }

    /// Full siblings of `pet_id`, split by whether they share its clutch date
    pub fn get_siblings(&self, pet_id: i32, viewer: Option<&str>) -> Result<SiblingsView> {
        self.db().read(|conn| {
            let pet = load_pet(conn, pet_id)?;
            let mut view = SiblingsView {
                pet_id,
                ..Default::default()
            };
            if !can_view_lineage(&pet, viewer) {
                return Ok(view);
            }
            let relation = get_relation(conn, pet_id)?.unwrap_or_default();
            let (Some(father_id), Some(mother_id)) = (relation.father_id, relation.mother_id) else {
                return Ok(view);
            };
            view.father_id = Some(father_id);
            view.mother_id = Some(mother_id);

            let sibling_ids: Vec<i32> = get_sibling_pet_ids(conn, father_id, mother_id)?
                .into_iter()
                .filter(|id| *id != pet_id)
                .collect();
            let siblings = pets::table
                .filter(pets::id.eq_any(&sibling_ids))
                .order(pets::id.asc())
                .load::<Pet>(conn)?;

            let mut laying_ids: Vec<i32> = siblings.iter().filter_map(|s| s.laying_id).collect();
            laying_ids.extend(pet.laying_id);
            let infos = laying_infos(conn, &laying_ids)?;
            let own_date = pet.laying_id.and_then(|id| infos.get(&id)).map(|i| i.laying_date.clone());

            for sibling in &siblings {
                let visible = filter_listed(Some(sibling), viewer);
                let laying = sibling.laying_id.and_then(|id| infos.get(&id)).cloned();
                let same = match (&own_date, &laying) {
                    (Some(own), Some(info)) => *own == info.laying_date,
                    _ => false,
                };
                let entry = SiblingEntry {
                    laying: if visible.full().is_some() { laying } else { None },
                    pet: visible,
                };
                if same {
                    view.same_clutch.push(entry);
                } else {
                    view.other_clutches.push(entry);
                }
            }
            view.other_clutches.sort_by(|a, b| {
                let date = |e: &SiblingEntry| e.laying.as_ref().map(|l| l.laying_date.clone());
                date(a).cmp(&date(b))
            });

            tracing::debug!(
                pet_id,
                same_clutch = view.same_clutch.len(),
                other_clutches = view.other_clutches.len(),
                "siblings resolved"
            );
            Ok(view)
        })
    }

    /// Breeding tree of `owner_id` as seen by `viewer`
    pub fn get_family_tree(&self, owner_id: &str, viewer: Option<&str>) -> Result<FamilyTree> {
        self.db().read(|conn| {
            let owner_pairs = pairs::table
                .filter(pairs::owner_id.eq(owner_id))
                .order(pairs::id.asc())
                .load::<Pair>(conn)?;
            let pair_ids: Vec<i32> = owner_pairs.iter().map(|p| p.id).collect();

            let pair_matings = matings::table
                .filter(matings::pair_id.eq_any(&pair_ids))
                .order((matings::mating_date.asc(), matings::id.asc()))
                .load::<Mating>(conn)?;
            let mating_ids: Vec<i32> = pair_matings.iter().map(|m| m.id).collect();

            let mating_layings = layings::table
                .filter(layings::mating_id.eq_any(&mating_ids))
                .order((layings::clutch.asc(), layings::id.asc()))
                .load::<Laying>(conn)?;
            let laying_ids: Vec<i32> = mating_layings.iter().map(|l| l.id).collect();

            let hatchlings = pets::table
                .filter(pets::laying_id.eq_any(&laying_ids))
                .order(pets::id.asc())
                .load::<Pet>(conn)?;
            let parent_ids: Vec<i32> = owner_pairs.iter().flat_map(|p| [p.father_id, p.mother_id]).collect();
            let parents: HashMap<i32, Pet> = pets::table
                .filter(pets::id.eq_any(&parent_ids))
                .load::<Pet>(conn)?
                .into_iter()
                .map(|p| (p.id, p))
                .collect();

            let mut hatchlings_by_laying: BTreeMap<i32, Vec<Visible<PetView>>> = BTreeMap::new();
            for pet in &hatchlings {
                if let Some(laying_id) = pet.laying_id {
                    hatchlings_by_laying
                        .entry(laying_id)
                        .or_default()
                        .push(filter_listed(Some(pet), viewer));
                }
            }
            let mut layings_by_mating: BTreeMap<i32, Vec<LayingNode>> = BTreeMap::new();
            for laying in mating_layings {
                layings_by_mating.entry(laying.mating_id).or_default().push(LayingNode {
                    laying_id: laying.id,
                    hatchlings: hatchlings_by_laying.remove(&laying.id).unwrap_or_default(),
                    laying_date: laying.laying_date,
                    clutch: laying.clutch,
                    egg_count: laying.egg_count,
                });
            }
            let mut matings_by_pair: BTreeMap<i32, Vec<MatingNode>> = BTreeMap::new();
            for mating in pair_matings {
                matings_by_pair.entry(mating.pair_id).or_default().push(MatingNode {
                    mating_id: mating.id,
                    layings: layings_by_mating.remove(&mating.id).unwrap_or_default(),
                    mating_date: mating.mating_date,
                });
            }

            // Breeding dates and clutch sizes of a pair stay with its owner
            // unless both parents are on view
            let is_owner = viewer == Some(owner_id);
            let pairs = owner_pairs
                .into_iter()
                .map(|pair| {
                    let father = filter_listed(parents.get(&pair.father_id), viewer);
                    let mother = filter_listed(parents.get(&pair.mother_id), viewer);
                    let matings = matings_by_pair.remove(&pair.id).unwrap_or_default();
                    let disclosed = is_owner || (father.full().is_some() && mother.full().is_some());
                    PairNode {
                        pair_id: pair.id,
                        father,
                        mother,
                        matings: if disclosed { matings } else { Vec::new() },
                        species: pair.species,
                    }
                })
                .collect();

            Ok(FamilyTree {
                owner_id: owner_id.to_string(),
                pairs,
            })
        })
    }

    /// A pet requested by id, with its parents
    pub fn get_pet_detail(&self, pet_id: i32, viewer: Option<&str>) -> Result<PetDetail> {
        self.db().read(|conn| {
            let pet = load_pet(conn, pet_id)?;
            let parents = parents_for(conn, &pet, viewer)?;
            Ok(PetDetail {
                pet: filter_detail(&pet, viewer),
                parents,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApproverPolicy;
    use crate::parent_request::ProposeInput;
    use crate::pets::test_support::gecko;
    use crate::pets::PetPatch;
    use crate::service::test_support::fixture;
    use crate::types::{HiddenStatus, Sex};

    fn propose(svc: &Service, user: &str, child: i32, parent: i32, role: Role) -> i32 {
        svc.propose(user, &ProposeInput { child_pet_id: child, parent_pet_id: parent, role, message: None })
            .unwrap()
            .id
    }

    #[test]
    fn test_private_approved_parent_is_secret_for_strangers() {
        let fx = fixture(ApproverPolicy::Counterpart);
        let svc = &fx.service;
        let dad = svc.create_pet("alice", &gecko("Sire", Sex::Male, false)).unwrap().id;
        let kid = svc.create_pet("bob", &gecko("Kid", Sex::Female, true)).unwrap().id;
        let request = propose(svc, "bob", kid, dad, Role::Father);
        svc.approve(request, "alice").unwrap();

        let seen = svc.get_parents_with_request_status(kid, Some("carol")).unwrap();
        let stub = seen.father.parent.stub().copied().unwrap();
        assert_eq!(stub.pet_id, dad);
        assert_eq!(stub.hidden_status, HiddenStatus::Secret);

        let json = serde_json::to_value(&seen).unwrap();
        assert!(json["father"]["parent"].get("morphs").is_none());
        assert!(json["mother"]["parent"].is_null());

        // The child's owner sees the private parent as a stub too
        let own = svc.get_parents_with_request_status(kid, Some("bob")).unwrap();
        assert_eq!(own.father.parent.stub().map(|s| s.hidden_status), Some(HiddenStatus::Secret));
        // And the parent's owner sees it in full
        let sire_owner = svc.get_parents_with_request_status(kid, Some("alice")).unwrap();
        assert!(sire_owner.father.parent.full().is_some());
    }

    #[test]
    fn test_pending_parent_only_visible_to_child_owner() {
        let fx = fixture(ApproverPolicy::Counterpart);
        let svc = &fx.service;
        let dad = svc.create_pet("alice", &gecko("Sire", Sex::Male, false)).unwrap().id;
        let kid = svc.create_pet("bob", &gecko("Kid", Sex::Female, true)).unwrap().id;
        propose(svc, "bob", kid, dad, Role::Father);

        let own = svc.get_parents_with_request_status(kid, Some("bob")).unwrap();
        assert_eq!(own.father.status, Some(RequestStatus::Pending));
        assert_eq!(own.father.parent.stub().map(|s| s.hidden_status), Some(HiddenStatus::Pending));

        let stranger = svc.get_parents_with_request_status(kid, Some("carol")).unwrap();
        assert!(stranger.father.parent.is_absent());
        assert_eq!(stranger.father.status, None);
    }

    #[test]
    fn test_deleted_parent_is_deleted_stub() {
        let fx = fixture(ApproverPolicy::Counterpart);
        let svc = &fx.service;
        let dad = svc.create_pet("alice", &gecko("Sire", Sex::Male, true)).unwrap().id;
        let kid = svc.create_pet("bob", &gecko("Kid", Sex::Female, true)).unwrap().id;
        let request = propose(svc, "alice", kid, dad, Role::Father);
        svc.approve(request, "bob").unwrap();
        svc.delete_pet(dad, "alice").unwrap();

        for viewer in [Some("bob"), Some("carol"), None] {
            let seen = svc.get_parents_with_request_status(kid, viewer).unwrap();
            assert_eq!(seen.father.parent.stub().map(|s| s.hidden_status), Some(HiddenStatus::Deleted));
        }
        let own = svc.get_parents_with_request_status(kid, Some("alice")).unwrap();
        assert_eq!(own.father.parent.full().map(|p| p.name.as_str()), Some("Sire"));
    }

    #[test]
    fn test_private_child_lineage_is_empty() {
        let fx = fixture(ApproverPolicy::Counterpart);
        let svc = &fx.service;
        let dad = svc.create_pet("bob", &gecko("Sire", Sex::Male, true)).unwrap().id;
        let kid = svc.create_pet("bob", &gecko("Kid", Sex::Female, false)).unwrap().id;
        propose(svc, "bob", kid, dad, Role::Father);

        let seen = svc.get_parents_with_request_status(kid, Some("carol")).unwrap();
        assert!(seen.father.parent.is_absent());
        assert!(svc.get_siblings(kid, Some("carol")).unwrap().same_clutch.is_empty());
        assert!(svc.get_parents_with_request_status(999, None).is_err());

        let detail = svc.get_pet_detail(kid, Some("carol")).unwrap();
        assert!(detail.pet.is_absent());
        let detail = svc.get_pet_detail(kid, Some("bob")).unwrap();
        assert_eq!(detail.parents.father.parent.full().map(|p| p.pet_id), Some(dad));
    }

    #[test]
    fn test_siblings_grouped_by_clutch() {
        let fx = fixture(ApproverPolicy::Counterpart);
        let svc = &fx.service;
        let dad = svc.create_pet("bob", &gecko("Sire", Sex::Male, true)).unwrap().id;
        let mom = svc.create_pet("bob", &gecko("Dam", Sex::Female, true)).unwrap().id;
        let pair = svc.create_pair("bob", dad, mom).unwrap();
        let mating = svc.create_mating("bob", pair.id, "2024-03-01").unwrap();
        let first = svc.create_laying("bob", mating.id, "2024-04-01", None, Some(2)).unwrap();
        let second = svc.create_laying("bob", mating.id, "2024-05-01", None, Some(2)).unwrap();

        let hatch = |name: &str, laying: i32, public: bool| {
            let mut input = gecko(name, Sex::Unknown, public);
            input.laying_id = Some(laying);
            svc.create_pet("bob", &input).unwrap().id
        };
        let me = hatch("Me", first.id, true);
        let twin = hatch("Twin", first.id, true);
        let later = hatch("Later", second.id, true);
        let secret = hatch("Secret", second.id, false);
        // Half-sibling: same father, different mother
        let other_mom = svc.create_pet("bob", &gecko("Other dam", Sex::Female, true)).unwrap().id;
        let half = svc.create_pet("bob", &gecko("Half", Sex::Unknown, true)).unwrap().id;
        propose(svc, "bob", half, dad, Role::Father);
        propose(svc, "bob", half, other_mom, Role::Mother);

        let view = svc.get_siblings(me, Some("carol")).unwrap();
        assert_eq!((view.father_id, view.mother_id), (Some(dad), Some(mom)));
        let same: Vec<i32> = view.same_clutch.iter().filter_map(|s| s.pet.full().map(|p| p.pet_id)).collect();
        assert_eq!(same, vec![twin]);
        assert_eq!(view.same_clutch[0].laying.as_ref().map(|l| l.clutch), Some(1));

        assert_eq!(view.other_clutches.len(), 2);
        let later_entry = view.other_clutches.iter().find(|s| s.pet.full().map(|p| p.pet_id) == Some(later));
        assert_eq!(later_entry.and_then(|e| e.laying.as_ref()).map(|l| l.clutch), Some(2));
        let hidden = view.other_clutches.iter().find(|s| s.pet.stub().is_some()).unwrap();
        assert_eq!(hidden.pet.stub().map(|s| (s.pet_id, s.hidden_status)), Some((secret, HiddenStatus::Secret)));
        assert!(hidden.laying.is_none());

        let all = view.same_clutch.iter().chain(&view.other_clutches);
        assert!(all.clone().all(|s| s.pet.full().map(|p| p.pet_id) != Some(half)));
        assert!(all.clone().all(|s| s.pet.full().map(|p| p.pet_id) != Some(me)));

        // The owner sees the private sibling in full
        let own = svc.get_siblings(me, Some("bob")).unwrap();
        assert!(own.other_clutches.iter().all(|s| s.pet.full().is_some()));
    }

    #[test]
    fn test_family_tree_shape() {
        let fx = fixture(ApproverPolicy::Counterpart);
        let svc = &fx.service;
        let dad = svc.create_pet("bob", &gecko("Sire", Sex::Male, true)).unwrap().id;
        let mom = svc.create_pet("bob", &gecko("Dam", Sex::Female, false)).unwrap().id;
        let pair = svc.create_pair("bob", dad, mom).unwrap();
        let mating = svc.create_mating("bob", pair.id, "2024-03-01").unwrap();
        let laying = svc.create_laying("bob", mating.id, "2024-04-01", None, None).unwrap();
        let mut input = gecko("Baby", Sex::Unknown, true);
        input.laying_id = Some(laying.id);
        let baby = svc.create_pet("bob", &input).unwrap().id;
        svc.update_pet(baby, "bob", &PetPatch { name: Some("Baby Blue".into()), ..Default::default() }).unwrap();

        // A stranger sees the pair but none of its breeding records
        let tree = svc.get_family_tree("bob", Some("carol")).unwrap();
        assert_eq!(tree.pairs.len(), 1);
        let node = &tree.pairs[0];
        assert!(node.father.full().is_some());
        assert_eq!(node.mother.stub().map(|s| s.hidden_status), Some(HiddenStatus::Secret));
        assert!(node.matings.is_empty());
        let json = serde_json::to_string(&tree).unwrap();
        assert!(!json.contains("2024-03-01"));
        assert!(!json.contains("2024-04-01"));
        assert!(svc.get_family_tree("bob", None).unwrap().pairs[0].matings.is_empty());

        let tree = svc.get_family_tree("bob", Some("bob")).unwrap();
        let node = &tree.pairs[0];
        assert_eq!(node.matings.len(), 1);
        assert_eq!(node.matings[0].layings.len(), 1);
        let hatchlings = &node.matings[0].layings[0].hatchlings;
        assert_eq!(hatchlings.len(), 1);
        assert_eq!(hatchlings[0].full().map(|p| p.name.as_str()), Some("Baby Blue"));

        assert!(svc.get_family_tree("nobody", None).unwrap().pairs.is_empty());
    }

    #[test]
    fn test_family_tree_shows_breeding_records_of_public_pairs() {
        let fx = fixture(ApproverPolicy::Counterpart);
        let svc = &fx.service;
        let dad = svc.create_pet("bob", &gecko("Sire", Sex::Male, true)).unwrap().id;
        let mom = svc.create_pet("bob", &gecko("Dam", Sex::Female, true)).unwrap().id;
        let pair = svc.create_pair("bob", dad, mom).unwrap();
        let mating = svc.create_mating("bob", pair.id, "2024-03-01").unwrap();
        svc.create_laying("bob", mating.id, "2024-04-01", None, Some(3)).unwrap();

        let tree = svc.get_family_tree("bob", None).unwrap();
        let node = &tree.pairs[0];
        assert_eq!(node.matings.len(), 1);
        assert_eq!(node.matings[0].layings[0].egg_count, Some(3));
    }
}
