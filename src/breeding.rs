//! Breeding records: pairs, matings and layings
//!
//! A pair is a breeder's standing male/female combination, a mating is one
//! dated event of that pair, a laying is one clutch from a mating. Hatchlings
//! point at their laying (see `Service::create_pet`).

use crate::db::{last_insert_id, load_pet, now, parse_date, Laying, Mating, NewLaying, NewMating, NewPair, Pair, Pet};
use crate::error::{AppError, Result};
use crate::schema::{layings, matings, pairs};
use crate::service::Service;
use crate::types::Role;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairInput {
    pub father_id: i32,
    pub mother_id: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatingInput {
    pub mating_date: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayingInput {
    pub laying_date: String,
    #[serde(default)]
    pub clutch: Option<i32>,
    #[serde(default)]
    pub egg_count: Option<i32>,
}

fn load_pair(conn: &mut SqliteConnection, pair_id: i32) -> Result<Pair> {
    pairs::table
        .find(pair_id)
        .first::<Pair>(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("Pair", pair_id))
}

fn load_mating(conn: &mut SqliteConnection, mating_id: i32) -> Result<Mating> {
    matings::table
        .find(mating_id)
        .first::<Mating>(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("Mating", mating_id))
}

/// A live pet owned by `owner` that can fill `role` in a pair.
///
/// Checked again for every mating, laying and hatchling so that breeding
/// records never outlive a parent's sale or deletion.
pub(crate) fn breeder(conn: &mut SqliteConnection, owner: &str, pet_id: i32, role: Role) -> Result<Pet> {
    let pet = load_pet(conn, pet_id)?;
    if pet.is_deleted {
        return Err(AppError::not_found("Pet", pet_id));
    }
    if !pet.is_owned_by(Some(owner)) {
        return Err(AppError::Forbidden(format!("Pet {} is not yours", pet_id)));
    }
    if !pet.sex().fits(role) {
        return Err(AppError::BadRequest(format!(
            "Pet {} is {} and cannot be paired as {}",
            pet_id,
            pet.sex(),
            role
        )));
    }
    Ok(pet)
}

impl Service {
    /// Declare a breeding pair. Both pets must belong to `owner`.
    pub fn create_pair(&self, owner: &str, father_id: i32, mother_id: i32) -> Result<Pair> {
        if father_id == mother_id {
            return Err(AppError::BadRequest("A pair needs two different pets".to_string()));
        }
        let pair = self.db().write(|conn| {
            let father = breeder(conn, owner, father_id, Role::Father)?;
            let mother = breeder(conn, owner, mother_id, Role::Mother)?;
            if !father.species.eq_ignore_ascii_case(&mother.species) {
                return Err(AppError::BadRequest(format!(
                    "Cannot pair a {} with a {}",
                    father.species, mother.species
                )));
            }

            let existing: i64 = pairs::table
                .filter(pairs::owner_id.eq(owner))
                .filter(pairs::father_id.eq(father_id))
                .filter(pairs::mother_id.eq(mother_id))
                .count()
                .get_result(conn)?;
            if existing > 0 {
                return Err(AppError::BadRequest(format!(
                    "Pets {} and {} are already paired",
                    father_id, mother_id
                )));
            }

            diesel::insert_into(pairs::table)
                .values(&NewPair {
                    owner_id: owner,
                    species: &father.species,
                    father_id,
                    mother_id,
                    created_at: &now(),
                })
                .execute(conn)?;
            let id = last_insert_id(conn)?;
            load_pair(conn, id)
        })?;

        tracing::info!(pair_id = pair.id, owner, father_id, mother_id, "pair created");
        Ok(pair)
    }

    pub fn list_pairs(&self, owner: &str) -> Result<Vec<Pair>> {
        self.db().read(|conn| {
            Ok(pairs::table
                .filter(pairs::owner_id.eq(owner))
                .order(pairs::id.asc())
                .load::<Pair>(conn)?)
        })
    }

    /// Record a mating of `pair_id` on `mating_date` (one per pair per day).
    /// Both parents must still be live and owned by `owner`.
    pub fn create_mating(&self, owner: &str, pair_id: i32, mating_date: &str) -> Result<Mating> {
        let mating_date = parse_date("matingDate", mating_date)?;
        let mating = self.db().write(|conn| {
            let pair = load_pair(conn, pair_id)?;
            if pair.owner_id != owner {
                return Err(AppError::Forbidden(format!("Pair {} is not yours", pair_id)));
            }
            breeder(conn, owner, pair.father_id, Role::Father)?;
            breeder(conn, owner, pair.mother_id, Role::Mother)?;
            let existing: i64 = matings::table
                .filter(matings::pair_id.eq(pair_id))
                .filter(matings::mating_date.eq(&mating_date))
                .count()
                .get_result(conn)?;
            if existing > 0 {
                return Err(AppError::BadRequest(format!(
                    "Pair {} already has a mating on {}",
                    pair_id, mating_date
                )));
            }

            diesel::insert_into(matings::table)
                .values(&NewMating {
                    pair_id,
                    father_id: pair.father_id,
                    mother_id: pair.mother_id,
                    mating_date: &mating_date,
                    created_at: &now(),
                })
                .execute(conn)?;
            let id = last_insert_id(conn)?;
            load_mating(conn, id)
        })?;

        tracing::info!(mating_id = mating.id, pair_id, date = %mating.mating_date, "mating recorded");
        Ok(mating)
    }

    pub fn list_matings(&self, pair_id: i32) -> Result<Vec<Mating>> {
        self.db().read(|conn| {
            load_pair(conn, pair_id)?;
            Ok(matings::table
                .filter(matings::pair_id.eq(pair_id))
                .order((matings::mating_date.asc(), matings::id.asc()))
                .load::<Mating>(conn)?)
        })
    }

    /// Record a clutch laid after `mating_id`.
    ///
    /// Without an explicit `clutch` number the next ordinal for the mating is
    /// used. The laying date cannot precede the mating.
    pub fn create_laying(
        &self,
        owner: &str,
        mating_id: i32,
        laying_date: &str,
        clutch: Option<i32>,
        egg_count: Option<i32>,
    ) -> Result<Laying> {
        let laying_date = parse_date("layingDate", laying_date)?;
        if matches!(clutch, Some(c) if c < 1) {
            return Err(AppError::BadRequest("clutch must be 1 or greater".to_string()));
        }
        if matches!(egg_count, Some(n) if n < 0) {
            return Err(AppError::BadRequest("eggCount must not be negative".to_string()));
        }

        let laying = self.db().write(|conn| {
            let mating = load_mating(conn, mating_id)?;
            let pair = load_pair(conn, mating.pair_id)?;
            if pair.owner_id != owner {
                return Err(AppError::Forbidden(format!("Mating {} is not yours", mating_id)));
            }
            breeder(conn, owner, mating.father_id, Role::Father)?;
            breeder(conn, owner, mating.mother_id, Role::Mother)?;
            // Both dates are normalized YYYY-MM-DD, so text order is date order
            if laying_date < mating.mating_date {
                return Err(AppError::BadRequest(format!(
                    "Laying date {} is before the mating on {}",
                    laying_date, mating.mating_date
                )));
            }
            let existing: i64 = layings::table
                .filter(layings::mating_id.eq(mating_id))
                .filter(layings::laying_date.eq(&laying_date))
                .count()
                .get_result(conn)?;
            if existing > 0 {
                return Err(AppError::BadRequest(format!(
                    "Mating {} already has a laying on {}",
                    mating_id, laying_date
                )));
            }

            let clutch = match clutch {
                Some(c) => c,
                None => {
                    let last: Option<i32> = layings::table
                        .filter(layings::mating_id.eq(mating_id))
                        .select(diesel::dsl::max(layings::clutch))
                        .first(conn)?;
                    last.unwrap_or(0) + 1
                }
            };

            diesel::insert_into(layings::table)
                .values(&NewLaying {
                    mating_id,
                    laying_date: &laying_date,
                    clutch,
                    egg_count,
                    created_at: &now(),
                })
                .execute(conn)?;
            let id = last_insert_id(conn)?;
            Ok(layings::table.find(id).first::<Laying>(conn)?)
        })?;

        tracing::info!(laying_id = laying.id, mating_id, clutch = laying.clutch, "laying recorded");
        Ok(laying)
    }

    pub fn list_layings(&self, mating_id: i32) -> Result<Vec<Laying>> {
        self.db().read(|conn| {
            load_mating(conn, mating_id)?;
            Ok(layings::table
                .filter(layings::mating_id.eq(mating_id))
                .order((layings::clutch.asc(), layings::id.asc()))
                .load::<Laying>(conn)?)
        })
    }
}
