//! Pet registration, profile edits and soft deletion

use crate::breeding::breeder;
use crate::db::{last_insert_id, load_pet, now, parse_date, Laying, Mating, NewPet, Pair, Pet};
use crate::error::{AppError, Result};
use crate::parent_request::{delete_all_for_pet, insert_request, materialize_approval};
use crate::schema::{adoptions, layings, matings, pairs, parent_requests, pets};
use crate::service::Service;
use crate::types::{encode_tags, AdoptionStatus, PetView, RequestStatus, Role, Sex, Visible};
use crate::visibility::filter_listed;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Deserialize;

/// New pet registration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetInput {
    pub name: String,
    pub species: String,
    #[serde(default)]
    pub sex: Option<Sex>,
    #[serde(default)]
    pub morphs: Vec<String>,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub hatching_date: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub is_public: Option<bool>,
    /// Register as a hatchling of this clutch; parents are recorded from the mating
    #[serde(default)]
    pub laying_id: Option<i32>,
}

/// Partial profile update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetPatch {
    pub name: Option<String>,
    pub species: Option<String>,
    pub sex: Option<Sex>,
    pub morphs: Option<Vec<String>>,
    pub traits: Option<Vec<String>>,
    pub hatching_date: Option<String>,
    pub weight: Option<f64>,
    pub is_public: Option<bool>,
}

#[derive(AsChangeset)]
#[diesel(table_name = pets)]
struct PetChanges {
    name: Option<String>,
    species: Option<String>,
    sex: Option<String>,
    morphs_json: Option<String>,
    traits_json: Option<String>,
    hatching_date: Option<String>,
    weight: Option<f64>,
    is_public: Option<bool>,
    updated_at: String,
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn check_weight(weight: Option<f64>) -> Result<()> {
    match weight {
        Some(w) if !w.is_finite() || w < 0.0 => {
            Err(AppError::BadRequest(format!("weight must be a non-negative number, got {}", w)))
        }
        _ => Ok(()),
    }
}

/// Refuse a sex the pet's recorded or proposed parent slots and pairs no
/// longer allow
fn check_sex_change(conn: &mut SqliteConnection, pet_id: i32, sex: Sex) -> Result<()> {
    let mut roles: Vec<Role> = parent_requests::table
        .filter(parent_requests::parent_pet_id.eq(pet_id))
        .filter(parent_requests::status.eq_any(vec![RequestStatus::Approved.as_str(), RequestStatus::Pending.as_str()]))
        .select(parent_requests::role)
        .load::<String>(conn)?
        .iter()
        .filter_map(|role| role.parse().ok())
        .collect();
    let sired: i64 = pairs::table.filter(pairs::father_id.eq(pet_id)).count().get_result(conn)?;
    if sired > 0 {
        roles.push(Role::Father);
    }
    let dammed: i64 = pairs::table.filter(pairs::mother_id.eq(pet_id)).count().get_result(conn)?;
    if dammed > 0 {
        roles.push(Role::Mother);
    }

    match roles.into_iter().find(|role| !sex.fits(*role)) {
        Some(role) => Err(AppError::BadRequest(format!(
            "Pet {} is recorded as a {} and cannot become {}",
            pet_id,
            role.as_str().to_lowercase(),
            sex
        ))),
        None => Ok(()),
    }
}

impl Service {
    /// Register a pet owned by `owner`.
    ///
    /// With `laying_id`, the caller must own the clutch's pair and both of its
    /// live parents; father and mother are recorded as approved lineage in the
    /// same transaction.
    pub fn create_pet(&self, owner: &str, input: &PetInput) -> Result<Pet> {
        require_text("name", &input.name)?;
        require_text("species", &input.species)?;
        check_weight(input.weight)?;
        let hatching_date = input
            .hatching_date
            .as_deref()
            .map(|d| parse_date("hatchingDate", d))
            .transpose()?;
        let morphs_json = encode_tags(&input.morphs);
        let traits_json = encode_tags(&input.traits);
        let sex = input.sex.unwrap_or(Sex::Unknown);

        let pet = self.db().write(|conn| {
            let parents = match input.laying_id {
                Some(laying_id) => {
                    let laying = layings::table
                        .find(laying_id)
                        .first::<Laying>(conn)
                        .optional()?
                        .ok_or_else(|| AppError::not_found("Laying", laying_id))?;
                    let mating = matings::table.find(laying.mating_id).first::<Mating>(conn)?;
                    let pair = pairs::table.find(mating.pair_id).first::<Pair>(conn)?;
                    if pair.owner_id != owner {
                        return Err(AppError::Forbidden(format!(
                            "Laying {} belongs to another breeder",
                            laying_id
                        )));
                    }
                    // Lineage is recorded as approved, so both parents must
                    // still be live and the caller's own
                    breeder(conn, owner, mating.father_id, Role::Father)?;
                    breeder(conn, owner, mating.mother_id, Role::Mother)?;
                    Some((mating.father_id, mating.mother_id))
                }
                None => None,
            };

            let now = now();
            diesel::insert_into(pets::table)
                .values(&NewPet {
                    owner_id: Some(owner),
                    name: input.name.trim(),
                    species: input.species.trim(),
                    sex: sex.as_str(),
                    morphs_json: &morphs_json,
                    traits_json: &traits_json,
                    hatching_date: hatching_date.as_deref(),
                    weight: input.weight,
                    laying_id: input.laying_id,
                    is_public: input.is_public.unwrap_or(true),
                    is_deleted: false,
                    created_at: &now,
                    updated_at: &now,
                })
                .execute(conn)?;
            let pet_id = last_insert_id(conn)?;

            if let Some((father_id, mother_id)) = parents {
                for (role, parent_id) in [(Role::Father, father_id), (Role::Mother, mother_id)] {
                    let request_id = insert_request(conn, owner, pet_id, parent_id, role, RequestStatus::Approved, None)?;
                    materialize_approval(conn, request_id, pet_id, role, parent_id)?;
                }
            }

            load_pet(conn, pet_id)
        })?;

        tracing::info!(pet_id = pet.id, owner, laying_id = ?pet.laying_id, "pet registered");
        Ok(pet)
    }

    /// Raw pet record, deleted pets included
    pub fn get_pet(&self, pet_id: i32) -> Result<Pet> {
        self.db().read(|conn| load_pet(conn, pet_id))
    }

    /// Pets owned by `owner` as seen by `viewer`.
    ///
    /// Owners see all their live pets; others see only public ones. Deleted
    /// pets are left out of listings.
    pub fn list_pets(&self, owner: &str, viewer: Option<&str>) -> Result<Vec<PetView>> {
        let owned = self.db().read(|conn| {
            Ok(pets::table
                .filter(pets::owner_id.eq(owner))
                .filter(pets::is_deleted.eq(false))
                .order(pets::id.asc())
                .load::<Pet>(conn)?)
        })?;
        Ok(owned
            .iter()
            .filter_map(|pet| match filter_listed(Some(pet), viewer) {
                Visible::Full(view) => Some(view),
                _ => None,
            })
            .collect())
    }

    /// Edit a pet's profile. Owner only; deleted pets are read-only.
    pub fn update_pet(&self, pet_id: i32, actor: &str, patch: &PetPatch) -> Result<Pet> {
        if let Some(name) = &patch.name {
            require_text("name", name)?;
        }
        if let Some(species) = &patch.species {
            require_text("species", species)?;
        }
        check_weight(patch.weight)?;
        let hatching_date = patch
            .hatching_date
            .as_deref()
            .map(|d| parse_date("hatchingDate", d))
            .transpose()?;

        let pet = self.db().write(|conn| {
            let pet = load_pet(conn, pet_id)?;
            if !pet.is_owned_by(Some(actor)) {
                return Err(AppError::Forbidden(format!("Pet {} is not yours", pet_id)));
            }
            if pet.is_deleted {
                return Err(AppError::BadRequest(format!("Pet {} has been deleted", pet_id)));
            }
            if let Some(sex) = patch.sex.filter(|s| *s != pet.sex()) {
                check_sex_change(conn, pet_id, sex)?;
            }

            let changes = PetChanges {
                name: patch.name.as_ref().map(|n| n.trim().to_string()),
                species: patch.species.as_ref().map(|s| s.trim().to_string()),
                sex: patch.sex.map(|s| s.as_str().to_string()),
                morphs_json: patch.morphs.as_deref().map(encode_tags),
                traits_json: patch.traits.as_deref().map(encode_tags),
                hatching_date,
                weight: patch.weight,
                is_public: patch.is_public,
                updated_at: now(),
            };
            diesel::update(pets::table.find(pet_id)).set(&changes).execute(conn)?;
            load_pet(conn, pet_id)
        })?;

        tracing::info!(pet_id, actor, "pet updated");
        Ok(pet)
    }

    /// Soft-delete a pet and invalidate every lineage request touching it.
    ///
    /// The row and its materialized relations stay so descendants keep their
    /// lineage; other viewers see a `DELETED` stub from now on.
    pub fn delete_pet(&self, pet_id: i32, actor: &str) -> Result<Pet> {
        let (pet, invalidated) = self.db().write(|conn| {
            let pet = load_pet(conn, pet_id)?;
            if !pet.is_owned_by(Some(actor)) {
                return Err(AppError::Forbidden(format!("Pet {} is not yours", pet_id)));
            }
            if pet.is_deleted {
                return Err(AppError::BadRequest(format!("Pet {} is already deleted", pet_id)));
            }
            let active_listings: i64 = adoptions::table
                .filter(adoptions::pet_id.eq(pet_id))
                .filter(adoptions::status.ne(AdoptionStatus::Sold.as_str()))
                .count()
                .get_result(conn)?;
            if active_listings > 0 {
                return Err(AppError::BadRequest(format!(
                    "Pet {} has an active adoption listing; remove it first",
                    pet_id
                )));
            }

            let now = now();
            diesel::update(pets::table.find(pet_id))
                .set((
                    pets::is_deleted.eq(true),
                    pets::deleted_at.eq(Some(now.clone())),
                    pets::updated_at.eq(&now),
                ))
                .execute(conn)?;
            let invalidated = delete_all_for_pet(conn, pet_id)?;
            Ok((load_pet(conn, pet_id)?, invalidated))
        })?;

        tracing::info!(pet_id, actor, invalidated_requests = invalidated, "pet deleted");
        Ok(pet)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn gecko(name: &str, sex: Sex, is_public: bool) -> PetInput {
        PetInput {
            name: name.to_string(),
            species: "leopard gecko".to_string(),
            sex: Some(sex),
            morphs: vec!["tremper albino".to_string()],
            traits: vec!["docile".to_string()],
            hatching_date: Some("2023-07-14".to_string()),
            weight: Some(55.5),
            is_public: Some(is_public),
            laying_id: None,
        }
    }
}
