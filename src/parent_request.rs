//! Parent request workflow
//!
//! A parent request proposes that one pet is the father or mother of another.
//! Approval and the materialized pointer update always share a transaction;
//! notifications go out only after that transaction commits.
//!
//! ```text
//! PENDING ──► APPROVED | REJECTED | CANCELLED
//!    any non-DELETED ──► DELETED   (pet removed, edge withdrawn, superseded)
//! ```

use crate::config::ApproverPolicy;
use crate::db::{find_pet, last_insert_id, load_pet, now, NewParentRequest, ParentRequest, Pet};
use crate::error::{AppError, Result};
use crate::notify::Notice;
use crate::relation::{get_relation, remove_parent_relation, upsert_parent_relation};
use crate::schema::{parent_requests, pets};
use crate::service::Service;
use crate::types::{NotificationType, RequestStatus, Role};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Deserialize;
use serde_json::json;

/// Body of `POST /parent-requests`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeInput {
    pub child_pet_id: i32,
    pub parent_pet_id: i32,
    pub role: Role,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `PUT /parent-requests/{id}/status`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: RequestStatus,
    #[serde(default)]
    pub reject_reason: Option<String>,
}

// ============================================================================
// Connection-level helpers shared with pet registration and deletion
// ============================================================================

pub(crate) fn insert_request(
    conn: &mut SqliteConnection,
    requester_id: &str,
    child_pet_id: i32,
    parent_pet_id: i32,
    role: Role,
    status: RequestStatus,
    message: Option<&str>,
) -> QueryResult<i32> {
    let now = now();
    diesel::insert_into(parent_requests::table)
        .values(&NewParentRequest {
            requester_id,
            child_pet_id,
            parent_pet_id,
            role: role.as_str(),
            status: status.as_str(),
            message,
            created_at: &now,
            updated_at: &now,
        })
        .execute(conn)?;
    last_insert_id(conn)
}

/// Record an approved edge: retire older approvals for the same slot and point
/// the child's `role` slot at the parent.
pub(crate) fn materialize_approval(
    conn: &mut SqliteConnection,
    request_id: i32,
    child_pet_id: i32,
    role: Role,
    parent_pet_id: i32,
) -> QueryResult<()> {
    let superseded = diesel::update(
        parent_requests::table
            .filter(parent_requests::child_pet_id.eq(child_pet_id))
            .filter(parent_requests::role.eq(role.as_str()))
            .filter(parent_requests::status.eq(RequestStatus::Approved.as_str()))
            .filter(parent_requests::id.ne(request_id)),
    )
    .set((
        parent_requests::status.eq(RequestStatus::Deleted.as_str()),
        parent_requests::updated_at.eq(now()),
    ))
    .execute(conn)?;
    if superseded > 0 {
        tracing::info!(child_pet_id, role = %role, superseded, "previous approvals superseded");
    }
    upsert_parent_relation(conn, child_pet_id, role, parent_pet_id)
}

/// Mark every live request touching `pet_id`, as child or parent, DELETED
pub(crate) fn delete_all_for_pet(conn: &mut SqliteConnection, pet_id: i32) -> QueryResult<usize> {
    diesel::update(
        parent_requests::table
            .filter(
                parent_requests::child_pet_id
                    .eq(pet_id)
                    .or(parent_requests::parent_pet_id.eq(pet_id)),
            )
            .filter(parent_requests::status.ne(RequestStatus::Deleted.as_str())),
    )
    .set((
        parent_requests::status.eq(RequestStatus::Deleted.as_str()),
        parent_requests::updated_at.eq(now()),
    ))
    .execute(conn)
}

/// The PENDING request for an edge, if any
pub(crate) fn pending_for_edge(
    conn: &mut SqliteConnection,
    child_pet_id: i32,
    parent_pet_id: i32,
    role: Role,
) -> QueryResult<Option<ParentRequest>> {
    parent_requests::table
        .filter(parent_requests::child_pet_id.eq(child_pet_id))
        .filter(parent_requests::parent_pet_id.eq(parent_pet_id))
        .filter(parent_requests::role.eq(role.as_str()))
        .filter(parent_requests::status.eq(RequestStatus::Pending.as_str()))
        .first::<ParentRequest>(conn)
        .optional()
}

/// The request backing an edge: the approved one if present, else the newest
pub(crate) fn edge_request(
    conn: &mut SqliteConnection,
    child_pet_id: i32,
    parent_pet_id: i32,
    role: Role,
) -> QueryResult<Option<ParentRequest>> {
    let requests = parent_requests::table
        .filter(parent_requests::child_pet_id.eq(child_pet_id))
        .filter(parent_requests::parent_pet_id.eq(parent_pet_id))
        .filter(parent_requests::role.eq(role.as_str()))
        .order(parent_requests::id.desc())
        .load::<ParentRequest>(conn)?;
    let approved = requests.iter().position(|r| r.status() == RequestStatus::Approved);
    Ok(match approved {
        Some(idx) => requests.into_iter().nth(idx),
        None => requests.into_iter().next(),
    })
}

/// Newest PENDING request for a child's `role` slot, whoever the parent is
pub(crate) fn latest_pending(
    conn: &mut SqliteConnection,
    child_pet_id: i32,
    role: Role,
) -> QueryResult<Option<ParentRequest>> {
    parent_requests::table
        .filter(parent_requests::child_pet_id.eq(child_pet_id))
        .filter(parent_requests::role.eq(role.as_str()))
        .filter(parent_requests::status.eq(RequestStatus::Pending.as_str()))
        .order(parent_requests::id.desc())
        .first::<ParentRequest>(conn)
        .optional()
}

fn load_request(conn: &mut SqliteConnection, request_id: i32) -> Result<ParentRequest> {
    parent_requests::table
        .find(request_id)
        .first::<ParentRequest>(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("ParentRequest", request_id))
}

/// A pet that may take part in a new proposal
fn live_pet(conn: &mut SqliteConnection, pet_id: i32) -> Result<Pet> {
    match find_pet(conn, pet_id)? {
        Some(pet) if !pet.is_deleted => Ok(pet),
        _ => Err(AppError::not_found("Pet", pet_id)),
    }
}

/// Owner of the side of the edge the requester did not claim from
fn counterpart_of(requester_id: &str, child: &Pet, parent: &Pet) -> Option<String> {
    if child.is_owned_by(Some(requester_id)) {
        parent.owner_id.clone()
    } else {
        child.owner_id.clone()
    }
}

fn request_detail(request: &ParentRequest) -> serde_json::Value {
    json!({
        "requestId": request.id,
        "requesterId": request.requester_id,
        "childPetId": request.child_pet_id,
        "parentPetId": request.parent_pet_id,
        "role": request.role,
        "status": request.status,
        "message": request.message,
        "rejectReason": request.reject_reason,
    })
}

impl Service {
    /// Propose `parent_pet_id` as the `role` of `child_pet_id`.
    ///
    /// Requesters owning both pets get an approved, materialized edge at once.
    /// Otherwise the request is PENDING and the counterpart is notified.
    pub fn propose(&self, requester_id: &str, input: &ProposeInput) -> Result<ParentRequest> {
        let message = input.message.as_deref().map(str::trim).filter(|m| !m.is_empty());

        let (request, notice) = self.db().write(|conn| {
            let child = live_pet(conn, input.child_pet_id)?;
            let parent = live_pet(conn, input.parent_pet_id)?;
            if child.id == parent.id {
                return Err(AppError::BadRequest("A pet cannot be its own parent".to_string()));
            }

            let owns_child = child.is_owned_by(Some(requester_id));
            let owns_parent = parent.is_owned_by(Some(requester_id));
            if !owns_child && !owns_parent {
                return Err(AppError::Forbidden(
                    "You must own the child or the proposed parent".to_string(),
                ));
            }
            if !parent.sex().fits(input.role) {
                return Err(AppError::BadRequest(format!(
                    "Pet {} is {} and cannot be a {}",
                    parent.id,
                    parent.sex(),
                    input.role
                )));
            }
            if let Some(existing) = pending_for_edge(conn, child.id, parent.id, input.role)? {
                return Err(AppError::BadRequest(format!(
                    "Parent request {} for this pair is already pending",
                    existing.id
                )));
            }
            let relation = get_relation(conn, child.id)?;
            if relation.and_then(|r| r.parent(input.role)) == Some(parent.id) {
                return Err(AppError::BadRequest(format!(
                    "Pet {} is already the recorded {} of pet {}",
                    parent.id, input.role, child.id
                )));
            }

            if owns_child && owns_parent {
                let id = insert_request(conn, requester_id, child.id, parent.id, input.role, RequestStatus::Approved, message)?;
                materialize_approval(conn, id, child.id, input.role, parent.id)?;
                return Ok((load_request(conn, id)?, None));
            }

            let receiver = counterpart_of(requester_id, &child, &parent).ok_or_else(|| {
                AppError::BadRequest("The other pet has no owner to approve the request".to_string())
            })?;
            let id = insert_request(conn, requester_id, child.id, parent.id, input.role, RequestStatus::Pending, message)?;
            let request = load_request(conn, id)?;
            let notice = Notice {
                receiver_id: receiver,
                kind: NotificationType::ParentRequest,
                target_id: id,
                detail: request_detail(&request),
            };
            Ok((request, Some(notice)))
        })?;

        tracing::info!(
            request_id = request.id,
            requester = requester_id,
            child_pet_id = request.child_pet_id,
            parent_pet_id = request.parent_pet_id,
            role = %request.role,
            status = %request.status,
            "parent request created"
        );
        if let Some(notice) = notice {
            self.notify(notice);
        }
        Ok(request)
    }

    /// The PENDING request for (child, parent, role), if one exists
    pub fn find_pending_request(&self, child_pet_id: i32, parent_pet_id: i32, role: Role) -> Result<Option<ParentRequest>> {
        self.db().read(|conn| Ok(pending_for_edge(conn, child_pet_id, parent_pet_id, role)?))
    }

    /// Approve a pending request and materialize the edge
    pub fn approve(&self, request_id: i32, actor_id: &str) -> Result<ParentRequest> {
        self.transition(request_id, actor_id, RequestStatus::Approved, None)
    }

    pub fn reject(&self, request_id: i32, actor_id: &str, reason: Option<&str>) -> Result<ParentRequest> {
        self.transition(request_id, actor_id, RequestStatus::Rejected, reason)
    }

    /// Withdraw a pending request. Only its requester may cancel.
    pub fn cancel(&self, request_id: i32, actor_id: &str) -> Result<ParentRequest> {
        self.transition(request_id, actor_id, RequestStatus::Cancelled, None)
    }

    /// Dispatch a status change from the API to approve, reject or cancel
    pub fn update_request_status(&self, request_id: i32, actor_id: &str, update: &StatusUpdate) -> Result<ParentRequest> {
        match update.status {
            RequestStatus::Approved => self.approve(request_id, actor_id),
            RequestStatus::Rejected => self.reject(request_id, actor_id, update.reject_reason.as_deref()),
            RequestStatus::Cancelled => self.cancel(request_id, actor_id),
            other => Err(AppError::BadRequest(format!(
                "Status can only be set to APPROVED, REJECTED or CANCELLED, not {}",
                other
            ))),
        }
    }

    fn transition(
        &self,
        request_id: i32,
        actor_id: &str,
        next: RequestStatus,
        reason: Option<&str>,
    ) -> Result<ParentRequest> {
        let policy = self.approver();
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());

        let (request, notice) = self.db().write(|conn| {
            let request = load_request(conn, request_id)?;
            let child = load_pet(conn, request.child_pet_id)?;
            let parent = load_pet(conn, request.parent_pet_id)?;
            let counterpart = counterpart_of(&request.requester_id, &child, &parent);

            let authorized = match (next, policy) {
                (RequestStatus::Cancelled, _) | (_, ApproverPolicy::Requester) => request.requester_id == actor_id,
                (_, ApproverPolicy::Counterpart) => counterpart.as_deref() == Some(actor_id),
            };
            if !authorized {
                return Err(AppError::Forbidden(format!(
                    "You may not set parent request {} to {}",
                    request_id, next
                )));
            }
            if !request.status().can_transition_to(next) {
                return Err(AppError::BadRequest(format!(
                    "Parent request {} is {}, not PENDING",
                    request_id, request.status
                )));
            }

            // Compare-and-swap: a concurrent decision leaves nothing to update
            let changed = diesel::update(
                parent_requests::table
                    .filter(parent_requests::id.eq(request_id))
                    .filter(parent_requests::status.eq(RequestStatus::Pending.as_str())),
            )
            .set((
                parent_requests::status.eq(next.as_str()),
                parent_requests::reject_reason.eq(reason),
                parent_requests::updated_at.eq(now()),
            ))
            .execute(conn)?;
            if changed == 0 {
                return Err(AppError::BadRequest(format!(
                    "Parent request {} was already decided",
                    request_id
                )));
            }

            if next == RequestStatus::Approved {
                materialize_approval(conn, request_id, request.child_pet_id, request.role(), request.parent_pet_id)?;
            }

            let updated = load_request(conn, request_id)?;
            let receiver = if actor_id == updated.requester_id {
                counterpart
            } else {
                Some(updated.requester_id.clone())
            };
            let kind = match next {
                RequestStatus::Approved => NotificationType::ParentApproved,
                RequestStatus::Rejected => NotificationType::ParentRejected,
                _ => NotificationType::ParentCancelled,
            };
            let notice = receiver.filter(|r| r != actor_id).map(|receiver_id| Notice {
                receiver_id,
                kind,
                target_id: request_id,
                detail: request_detail(&updated),
            });
            Ok((updated, notice))
        })?;

        tracing::info!(request_id, actor = actor_id, status = %next, "parent request decided");
        if let Some(notice) = notice {
            self.notify(notice);
        }
        Ok(request)
    }

    /// Remove the child's recorded `role` parent. Child owner only.
    ///
    /// Every live request for that slot becomes DELETED and the materialized
    /// pointer is cleared; the other slot is untouched.
    pub fn withdraw_parent(&self, child_pet_id: i32, role: Role, actor_id: &str) -> Result<usize> {
        let withdrawn = self.db().write(|conn| {
            let child = load_pet(conn, child_pet_id)?;
            if !child.is_owned_by(Some(actor_id)) {
                return Err(AppError::Forbidden(format!("Pet {} is not yours", child_pet_id)));
            }
            let recorded = get_relation(conn, child_pet_id)?.and_then(|r| r.parent(role));

            let withdrawn = diesel::update(
                parent_requests::table
                    .filter(parent_requests::child_pet_id.eq(child_pet_id))
                    .filter(parent_requests::role.eq(role.as_str()))
                    .filter(parent_requests::status.ne(RequestStatus::Deleted.as_str())),
            )
            .set((
                parent_requests::status.eq(RequestStatus::Deleted.as_str()),
                parent_requests::updated_at.eq(now()),
            ))
            .execute(conn)?;

            if recorded.is_none() && withdrawn == 0 {
                return Err(AppError::BadRequest(format!(
                    "Pet {} has no {} to withdraw",
                    child_pet_id, role
                )));
            }
            remove_parent_relation(conn, child_pet_id, role)?;
            Ok(withdrawn)
        })?;

        tracing::info!(child_pet_id, role = %role, actor = actor_id, withdrawn, "parent withdrawn");
        Ok(withdrawn)
    }

    /// Requests `user` sent plus those on pets they own, newest first
    pub fn list_requests_for_user(&self, user: &str, status: Option<RequestStatus>) -> Result<Vec<ParentRequest>> {
        self.db().read(|conn| {
            let owned = || pets::table.filter(pets::owner_id.eq(user)).select(pets::id);
            let mut query = parent_requests::table
                .filter(
                    parent_requests::requester_id
                        .eq(user)
                        .or(parent_requests::child_pet_id.eq_any(owned()))
                        .or(parent_requests::parent_pet_id.eq_any(owned())),
                )
                .into_boxed();
            if let Some(status) = status {
                query = query.filter(parent_requests::status.eq(status.as_str()));
            }
            Ok(query.order(parent_requests::id.desc()).load::<ParentRequest>(conn)?)
        })
    }

    /// One request, visible to its requester and the owners of either pet
    pub fn get_request(&self, request_id: i32, viewer: &str) -> Result<ParentRequest> {
        self.db().read(|conn| {
            let request = load_request(conn, request_id)?;
            let child = load_pet(conn, request.child_pet_id)?;
            let parent = load_pet(conn, request.parent_pet_id)?;
            let involved = request.requester_id == viewer
                || child.is_owned_by(Some(viewer))
                || parent.is_owned_by(Some(viewer));
            if !involved {
                return Err(AppError::not_found("ParentRequest", request_id));
            }
            Ok(request)
        })
    }
}
