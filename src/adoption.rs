//! Adoption listings
//!
//! ```text
//! NFS ⇄ ON_SALE ⇄ ON_RESERVATION ──► SOLD (terminal)
//! ```
//!
//! A buyer may be recorded only while reserved or sold. Selling moves the
//! pet to the buyer inside the same transaction that marks the listing SOLD.

use crate::db::{last_insert_id, load_pet, now, parse_date, today, Adoption, NewAdoption};
use crate::error::{AppError, Result};
use crate::lineage::{parents_for, ParentsView};
use crate::notify::Notice;
use crate::schema::{adoptions, pets};
use crate::service::Service;
use crate::types::{AdoptionStatus, NotificationType, PetView, Visible};
use crate::visibility::filter_listed;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoptionInput {
    pub pet_id: i32,
    #[serde(default)]
    pub status: Option<AdoptionStatus>,
    #[serde(default)]
    pub price: Option<i32>,
    #[serde(default)]
    pub memo: Option<String>,
}

/// Changes to a listing; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoptionPatch {
    pub status: Option<AdoptionStatus>,
    pub buyer_id: Option<String>,
    pub price: Option<i32>,
    pub adoption_date: Option<String>,
    pub memo: Option<String>,
}

/// A listing with its pet and the pet's parents attached
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoptionView {
    #[serde(flatten)]
    pub adoption: Adoption,
    pub pet: Visible<PetView>,
    pub parents: ParentsView,
}

fn load_adoption(conn: &mut SqliteConnection, adoption_id: i32) -> Result<Adoption> {
    adoptions::table
        .find(adoption_id)
        .first::<Adoption>(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("Adoption", adoption_id))
}

fn check_price(price: Option<i32>) -> Result<()> {
    if matches!(price, Some(p) if p < 0) {
        return Err(AppError::BadRequest("price must not be negative".to_string()));
    }
    Ok(())
}

impl Service {
    /// List one of the seller's pets. At most one active listing per pet.
    pub fn create_adoption(&self, seller: &str, input: &AdoptionInput) -> Result<Adoption> {
        check_price(input.price)?;
        let status = input.status.unwrap_or(AdoptionStatus::OnSale);
        if status == AdoptionStatus::Sold {
            return Err(AppError::BadRequest(
                "A listing cannot start as SOLD; record a buyer first".to_string(),
            ));
        }
        let memo = input.memo.as_deref().map(str::trim).filter(|m| !m.is_empty());

        let adoption = self.db().write(|conn| {
            let pet = load_pet(conn, input.pet_id)?;
            if pet.is_deleted {
                return Err(AppError::not_found("Pet", input.pet_id));
            }
            if !pet.is_owned_by(Some(seller)) {
                return Err(AppError::Forbidden(format!("Pet {} is not yours", pet.id)));
            }
            let active: i64 = adoptions::table
                .filter(adoptions::pet_id.eq(pet.id))
                .filter(adoptions::status.ne(AdoptionStatus::Sold.as_str()))
                .count()
                .get_result(conn)?;
            if active > 0 {
                return Err(AppError::BadRequest(format!("Pet {} already has an active listing", pet.id)));
            }

            let now = now();
            diesel::insert_into(adoptions::table)
                .values(&NewAdoption {
                    pet_id: pet.id,
                    seller_id: seller,
                    status: status.as_str(),
                    price: input.price,
                    memo,
                    created_at: &now,
                    updated_at: &now,
                })
                .execute(conn)?;
            let id = last_insert_id(conn)?;
            load_adoption(conn, id)
        })?;

        tracing::info!(adoption_id = adoption.id, pet_id = adoption.pet_id, seller, status = %adoption.status, "adoption listed");
        Ok(adoption)
    }

    /// Move a listing through its states. Seller only.
    ///
    /// SOLD needs a buyer and transfers the pet to them atomically; the buyer
    /// is notified after commit.
    pub fn update_adoption(&self, adoption_id: i32, actor: &str, patch: &AdoptionPatch) -> Result<Adoption> {
        check_price(patch.price)?;
        let adoption_date = patch
            .adoption_date
            .as_deref()
            .map(|d| parse_date("adoptionDate", d))
            .transpose()?;

        let (adoption, notice) = self.db().write(|conn| {
            let current = load_adoption(conn, adoption_id)?;
            if current.seller_id != actor {
                return Err(AppError::Forbidden(format!("Adoption {} is not yours", adoption_id)));
            }
            if current.status() == AdoptionStatus::Sold {
                return Err(AppError::BadRequest(format!("Adoption {} is already SOLD", adoption_id)));
            }

            let status = patch.status.unwrap_or(current.status());
            let requested_buyer = patch.buyer_id.as_deref().map(str::trim).filter(|b| !b.is_empty());
            if requested_buyer.is_some() && !status.allows_buyer() {
                return Err(AppError::BadRequest(format!(
                    "A buyer can only be set when the status is ON_RESERVATION or SOLD, not {}",
                    status
                )));
            }
            // Going back on sale releases any reservation
            let buyer = match requested_buyer {
                Some(b) => Some(b.to_string()),
                None if status.allows_buyer() => current.buyer_id.clone(),
                None => None,
            };

            let sold = status == AdoptionStatus::Sold;
            let adoption_date = match (sold, adoption_date) {
                (_, Some(date)) => Some(date),
                (true, None) => Some(current.adoption_date.clone().unwrap_or_else(today)),
                (false, None) => current.adoption_date.clone(),
            };
            if sold {
                match buyer.as_deref() {
                    None => return Err(AppError::BadRequest("SOLD requires a buyer".to_string())),
                    Some(b) if b == actor => {
                        return Err(AppError::BadRequest("A seller cannot buy their own pet".to_string()))
                    }
                    Some(_) => {}
                }
            }

            let now = now();
            let memo = patch.memo.clone().or(current.memo.clone());
            diesel::update(adoptions::table.find(adoption_id))
                .set((
                    adoptions::status.eq(status.as_str()),
                    adoptions::buyer_id.eq(buyer.as_deref()),
                    adoptions::price.eq(patch.price.or(current.price)),
                    adoptions::adoption_date.eq(adoption_date.as_deref()),
                    adoptions::memo.eq(memo.as_deref()),
                    adoptions::updated_at.eq(&now),
                ))
                .execute(conn)?;

            let mut notice = None;
            if sold {
                diesel::update(pets::table.find(current.pet_id))
                    .set((pets::owner_id.eq(buyer.as_deref()), pets::updated_at.eq(&now)))
                    .execute(conn)?;
                notice = buyer.clone().map(|receiver_id| Notice {
                    receiver_id,
                    kind: NotificationType::AdoptionSold,
                    target_id: adoption_id,
                    detail: json!({
                        "adoptionId": adoption_id,
                        "petId": current.pet_id,
                        "sellerId": current.seller_id,
                        "price": patch.price.or(current.price),
                    }),
                });
            }
            Ok((load_adoption(conn, adoption_id)?, notice))
        })?;

        tracing::info!(adoption_id, actor, status = %adoption.status, buyer = ?adoption.buyer_id, "adoption updated");
        if let Some(notice) = notice {
            self.notify(notice);
        }
        Ok(adoption)
    }

    /// A listing with its pet and the pet's parents, filtered for `viewer`
    pub fn get_adoption(&self, adoption_id: i32, viewer: Option<&str>) -> Result<AdoptionView> {
        self.db().read(|conn| {
            let adoption = load_adoption(conn, adoption_id)?;
            let pet = load_pet(conn, adoption.pet_id)?;
            let parents = parents_for(conn, &pet, viewer)?;
            Ok(AdoptionView {
                adoption,
                pet: filter_listed(Some(&pet), viewer),
                parents,
            })
        })
    }

    /// Listings, newest first, optionally narrowed by status and seller
    pub fn list_adoptions(&self, status: Option<AdoptionStatus>, seller: Option<&str>) -> Result<Vec<Adoption>> {
        self.db().read(|conn| {
            let mut query = adoptions::table.into_boxed();
            if let Some(status) = status {
                query = query.filter(adoptions::status.eq(status.as_str()));
            }
            if let Some(seller) = seller {
                query = query.filter(adoptions::seller_id.eq(seller));
            }
            Ok(query.order(adoptions::id.desc()).load::<Adoption>(conn)?)
        })
    }

    /// Remove an unsold listing. Seller only.
    pub fn delete_adoption(&self, adoption_id: i32, actor: &str) -> Result<()> {
        self.db().write(|conn| {
            let adoption = load_adoption(conn, adoption_id)?;
            if adoption.seller_id != actor {
                return Err(AppError::Forbidden(format!("Adoption {} is not yours", adoption_id)));
            }
            if adoption.status() == AdoptionStatus::Sold {
                return Err(AppError::BadRequest("Completed sales are kept as records".to_string()));
            }
            diesel::delete(adoptions::table.find(adoption_id)).execute(conn)?;
            Ok(())
        })?;
        tracing::info!(adoption_id, actor, "adoption removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApproverPolicy;
    use crate::pets::test_support::gecko;
    use crate::service::test_support::fixture;
    use crate::types::Sex;

    fn listing(pet_id: i32) -> AdoptionInput {
        AdoptionInput {
            pet_id,
            status: None,
            price: Some(150),
            memo: Some("eats well".to_string()),
        }
    }

    #[test]
    fn test_sold_transfers_ownership() {
        let fx = fixture(ApproverPolicy::Counterpart);
        let svc = &fx.service;
        let pet = svc.create_pet("alice", &gecko("Gecko-1", Sex::Male, true)).unwrap();
        let adoption = svc.create_adoption("alice", &listing(pet.id)).unwrap();
        assert_eq!(adoption.status(), AdoptionStatus::OnSale);

        let reserve = AdoptionPatch {
            status: Some(AdoptionStatus::OnReservation),
            buyer_id: Some("bob".to_string()),
            ..Default::default()
        };
        let reserved = svc.update_adoption(adoption.id, "alice", &reserve).unwrap();
        assert_eq!(reserved.buyer_id.as_deref(), Some("bob"));
        assert_eq!(svc.get_pet(pet.id).unwrap().owner_id.as_deref(), Some("alice"));

        let sell = AdoptionPatch { status: Some(AdoptionStatus::Sold), ..Default::default() };
        let sold = svc.update_adoption(adoption.id, "alice", &sell).unwrap();
        assert_eq!(sold.status(), AdoptionStatus::Sold);
        assert!(sold.adoption_date.is_some());
        assert_eq!(sold.price, Some(150));
        assert_eq!(svc.get_pet(pet.id).unwrap().owner_id, sold.buyer_id);

        let sent = fx.notices.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].receiver_id, "bob");
        assert_eq!(sent[0].kind, NotificationType::AdoptionSold);

        // Terminal
        assert!(matches!(svc.update_adoption(adoption.id, "alice", &sell), Err(AppError::BadRequest(_))));
        // The new owner can list it again
        svc.create_adoption("bob", &listing(pet.id)).unwrap();
    }

    #[test]
    fn test_buyer_only_when_reserved_or_sold() {
        let fx = fixture(ApproverPolicy::Counterpart);
        let svc = &fx.service;
        let pet = svc.create_pet("alice", &gecko("Gecko-1", Sex::Male, true)).unwrap();
        let adoption = svc.create_adoption("alice", &listing(pet.id)).unwrap();

        let early_buyer = AdoptionPatch { buyer_id: Some("bob".to_string()), ..Default::default() };
        assert!(matches!(svc.update_adoption(adoption.id, "alice", &early_buyer), Err(AppError::BadRequest(_))));

        let no_buyer = AdoptionPatch { status: Some(AdoptionStatus::Sold), ..Default::default() };
        assert!(matches!(svc.update_adoption(adoption.id, "alice", &no_buyer), Err(AppError::BadRequest(_))));
        assert!(matches!(svc.update_adoption(adoption.id, "bob", &no_buyer), Err(AppError::Forbidden(_))));

        let reserve = AdoptionPatch {
            status: Some(AdoptionStatus::OnReservation),
            buyer_id: Some("bob".to_string()),
            ..Default::default()
        };
        svc.update_adoption(adoption.id, "alice", &reserve).unwrap();
        let back_on_sale = AdoptionPatch { status: Some(AdoptionStatus::OnSale), ..Default::default() };
        let released = svc.update_adoption(adoption.id, "alice", &back_on_sale).unwrap();
        assert_eq!(released.buyer_id, None);
        assert_eq!(svc.get_pet(pet.id).unwrap().owner_id.as_deref(), Some("alice"));
    }

    #[test]
    fn test_one_active_listing_per_pet() {
        let fx = fixture(ApproverPolicy::Counterpart);
        let svc = &fx.service;
        let pet = svc.create_pet("alice", &gecko("Gecko-1", Sex::Male, true)).unwrap();
        let adoption = svc.create_adoption("alice", &listing(pet.id)).unwrap();

        assert!(matches!(svc.create_adoption("alice", &listing(pet.id)), Err(AppError::BadRequest(_))));
        assert!(matches!(svc.create_adoption("bob", &listing(pet.id)), Err(AppError::Forbidden(_))));
        assert!(matches!(svc.delete_pet(pet.id, "alice"), Err(AppError::BadRequest(_))));

        svc.delete_adoption(adoption.id, "alice").unwrap();
        svc.delete_pet(pet.id, "alice").unwrap();
        assert!(matches!(svc.create_adoption("alice", &listing(pet.id)), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_get_adoption_attaches_parents() {
        let fx = fixture(ApproverPolicy::Counterpart);
        let svc = &fx.service;
        let dad = svc.create_pet("alice", &gecko("Sire", Sex::Male, true)).unwrap().id;
        let mom = svc.create_pet("alice", &gecko("Dam", Sex::Female, true)).unwrap().id;
        let pair = svc.create_pair("alice", dad, mom).unwrap();
        let mating = svc.create_mating("alice", pair.id, "2024-03-01").unwrap();
        let laying = svc.create_laying("alice", mating.id, "2024-04-01", None, None).unwrap();
        let mut input = gecko("Baby", Sex::Unknown, true);
        input.laying_id = Some(laying.id);
        let baby = svc.create_pet("alice", &input).unwrap().id;

        let adoption = svc.create_adoption("alice", &listing(baby)).unwrap();
        let view = svc.get_adoption(adoption.id, None).unwrap();
        assert_eq!(view.pet.full().map(|p| p.pet_id), Some(baby));
        assert_eq!(view.parents.father.parent.full().map(|p| p.pet_id), Some(dad));
        assert_eq!(view.parents.mother.parent.full().map(|p| p.pet_id), Some(mom));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "ON_SALE");
        assert_eq!(json["petId"], baby);

        assert_eq!(svc.list_adoptions(Some(AdoptionStatus::OnSale), None).unwrap().len(), 1);
        assert!(svc.list_adoptions(Some(AdoptionStatus::Sold), None).unwrap().is_empty());
        assert!(svc.list_adoptions(None, Some("bob")).unwrap().is_empty());
    }
}
