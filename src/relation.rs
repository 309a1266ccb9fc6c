//! Materialized father/mother pointers
//!
//! `pet_relations` is an index over approved parent requests, not a source of
//! truth. Every function here takes the caller's connection so the pointer
//! update commits or rolls back together with the request transition that
//! caused it.

use crate::db::{now, NewPetRelation, PetRelation};
use crate::schema::pet_relations;
use crate::types::Role;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

/// Point `pet_id`'s `role` slot at `parent_pet_id`, leaving the other slot untouched
pub fn upsert_parent_relation(
    conn: &mut SqliteConnection,
    pet_id: i32,
    role: Role,
    parent_pet_id: i32,
) -> QueryResult<()> {
    let now = now();
    let existing = get_relation(conn, pet_id)?;

    match (existing, role) {
        (Some(_), Role::Father) => {
            diesel::update(pet_relations::table.find(pet_id))
                .set((
                    pet_relations::father_id.eq(Some(parent_pet_id)),
                    pet_relations::updated_at.eq(&now),
                ))
                .execute(conn)?;
        }
        (Some(_), Role::Mother) => {
            diesel::update(pet_relations::table.find(pet_id))
                .set((
                    pet_relations::mother_id.eq(Some(parent_pet_id)),
                    pet_relations::updated_at.eq(&now),
                ))
                .execute(conn)?;
        }
        (None, role) => {
            let (father_id, mother_id) = match role {
                Role::Father => (Some(parent_pet_id), None),
                Role::Mother => (None, Some(parent_pet_id)),
            };
            diesel::insert_into(pet_relations::table)
                .values(&NewPetRelation {
                    pet_id,
                    father_id,
                    mother_id,
                    updated_at: &now,
                })
                .execute(conn)?;
        }
    }

    tracing::debug!(pet_id, role = %role, parent_pet_id, "parent relation materialized");
    Ok(())
}

/// Clear `pet_id`'s `role` slot. No-op when the pet has no relation row.
pub fn remove_parent_relation(conn: &mut SqliteConnection, pet_id: i32, role: Role) -> QueryResult<()> {
    let now = now();
    let changed = match role {
        Role::Father => diesel::update(pet_relations::table.find(pet_id))
            .set((pet_relations::father_id.eq(None::<i32>), pet_relations::updated_at.eq(&now)))
            .execute(conn)?,
        Role::Mother => diesel::update(pet_relations::table.find(pet_id))
            .set((pet_relations::mother_id.eq(None::<i32>), pet_relations::updated_at.eq(&now)))
            .execute(conn)?,
    };
    tracing::debug!(pet_id, role = %role, changed, "parent relation cleared");
    Ok(())
}

/// Materialized relation for `pet_id`, if any
pub fn get_relation(conn: &mut SqliteConnection, pet_id: i32) -> QueryResult<Option<PetRelation>> {
    pet_relations::table.find(pet_id).first::<PetRelation>(conn).optional()
}

/// All pets whose father AND mother match exactly. Half-siblings are not returned.
pub fn get_sibling_pet_ids(conn: &mut SqliteConnection, father_id: i32, mother_id: i32) -> QueryResult<Vec<i32>> {
    pet_relations::table
        .filter(pet_relations::father_id.eq(father_id))
        .filter(pet_relations::mother_id.eq(mother_id))
        .select(pet_relations::pet_id)
        .order(pet_relations::pet_id.asc())
        .load(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_db;
    use crate::db::{last_insert_id, NewPet};
    use crate::error::Result;
    use crate::schema::pets;

    fn insert_pet(conn: &mut SqliteConnection, name: &str) -> QueryResult<i32> {
        let now = now();
        diesel::insert_into(pets::table)
            .values(&NewPet {
                owner_id: Some("keeper"),
                name,
                species: "crested gecko",
                sex: "UNKNOWN",
                morphs_json: "[]",
                traits_json: "[]",
                hatching_date: None,
                weight: None,
                laying_id: None,
                is_public: true,
                is_deleted: false,
                created_at: &now,
                updated_at: &now,
            })
            .execute(conn)?;
        last_insert_id(conn)
    }

    #[test]
    fn test_upsert_sets_only_requested_role() {
        let (db, _dir) = temp_db();
        let relation = db
            .write(|conn| -> Result<Option<PetRelation>> {
                let child = insert_pet(conn, "child")?;
                let dad = insert_pet(conn, "dad")?;
                let mom = insert_pet(conn, "mom")?;

                upsert_parent_relation(conn, child, Role::Father, dad)?;
                let after_father = get_relation(conn, child)?.unwrap();
                assert_eq!(after_father.father_id, Some(dad));
                assert_eq!(after_father.mother_id, None);

                upsert_parent_relation(conn, child, Role::Mother, mom)?;
                Ok(get_relation(conn, child)?)
            })
            .unwrap()
            .unwrap();
        assert!(relation.father_id.is_some());
        assert!(relation.mother_id.is_some());
    }

    #[test]
    fn test_remove_is_noop_without_row() {
        let (db, _dir) = temp_db();
        db.write(|conn| -> Result<()> {
            let lonely = insert_pet(conn, "lonely")?;
            remove_parent_relation(conn, lonely, Role::Mother)?;
            assert!(get_relation(conn, lonely)?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_remove_keeps_other_role_and_row() {
        let (db, _dir) = temp_db();
        db.write(|conn| -> Result<()> {
            let child = insert_pet(conn, "child")?;
            let dad = insert_pet(conn, "dad")?;
            let mom = insert_pet(conn, "mom")?;
            upsert_parent_relation(conn, child, Role::Father, dad)?;
            upsert_parent_relation(conn, child, Role::Mother, mom)?;

            remove_parent_relation(conn, child, Role::Father)?;
            let relation = get_relation(conn, child)?.unwrap();
            assert_eq!(relation.father_id, None);
            assert_eq!(relation.mother_id, Some(mom));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_siblings_require_both_parents() {
        let (db, _dir) = temp_db();
        db.write(|conn| -> Result<()> {
            let dad = insert_pet(conn, "dad")?;
            let mom = insert_pet(conn, "mom")?;
            let other_mom = insert_pet(conn, "other mom")?;
            let a = insert_pet(conn, "a")?;
            let b = insert_pet(conn, "b")?;
            let half = insert_pet(conn, "half")?;
            let fatherless = insert_pet(conn, "fatherless")?;

            for pet in [a, b] {
                upsert_parent_relation(conn, pet, Role::Father, dad)?;
                upsert_parent_relation(conn, pet, Role::Mother, mom)?;
            }
            upsert_parent_relation(conn, half, Role::Father, dad)?;
            upsert_parent_relation(conn, half, Role::Mother, other_mom)?;
            upsert_parent_relation(conn, fatherless, Role::Mother, mom)?;

            assert_eq!(get_sibling_pet_ids(conn, dad, mom)?, vec![a, b]);
            Ok(())
        })
        .unwrap();
    }
}
