use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::storage::Storage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub members: Vec<String>,
    pub admin: String,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub id: u64,
    pub user: String,
    pub group_id: u64,
    pub status: JoinStatus,
    pub requested_at: String,
}

#[derive(Debug, Deserialize)]
pub struct NewGroup {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default = "default_user")]
    pub created_by: String,
    pub created_at: Option<String>,
}

fn default_user() -> String {
    "alex".to_owned()
}

/// Group annotated with the searching user's relationship to it.
#[derive(Debug, Serialize)]
pub struct GroupWithStatus {
    #[serde(flatten)]
    pub group: Group,
    pub is_member: bool,
    pub has_pending_request: bool,
}

#[derive(Debug)]
pub struct GroupDetails {
    pub group: Group,
    pub is_admin: bool,
    pub pending_requests: Vec<JoinRequest>,
}

struct Inner {
    groups: Vec<Group>,
    requests: Vec<JoinRequest>,
    next_group_id: u64,
    next_request_id: u64,
}

/// Owns the group and join-request collections. All mutations run under one
/// lock and persist before returning, so ids stay unique under concurrency
/// and are never reused.
#[derive(Clone)]
pub struct GroupStore {
    inner: Arc<Mutex<Inner>>,
    storage: Storage,
}

impl GroupStore {
    pub fn open(storage: Storage) -> anyhow::Result<Self> {
        let groups: Vec<Group> = storage.load_or_default("groups")?;
        let requests: Vec<JoinRequest> = storage.load_or_default("join_requests")?;

        let next_group_id = groups.iter().map(|g| g.id).max().unwrap_or(0) + 1;
        let next_request_id = requests.iter().map(|r| r.id).max().unwrap_or(0) + 1;

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                groups,
                requests,
                next_group_id,
                next_request_id,
            })),
            storage,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn create_group(&self, req: NewGroup) -> AppResult<Group> {
        let (Some(name), Some(description)) = (req.name, req.description) else {
            return Err(AppError::validation("Missing required fields"));
        };

        let mut inner = self.lock();
        let group = Group {
            id: inner.next_group_id,
            name,
            description,
            members: vec![req.created_by.clone()],
            admin: req.created_by.clone(),
            created_by: req.created_by,
            created_at: req.created_at.unwrap_or_else(|| Utc::now().to_rfc3339()),
        };
        inner.next_group_id += 1;
        inner.groups.push(group.clone());
        self.storage.save("groups", &inner.groups)?;

        tracing::info!(group = group.id, admin = %group.admin, "group created");
        Ok(group)
    }

    pub fn get(&self, group_id: u64) -> Option<Group> {
        self.lock().groups.iter().find(|g| g.id == group_id).cloned()
    }

    /// Personal dashboard listing: only groups the user belongs to,
    /// in insertion order.
    pub fn groups_for_user(&self, user: &str) -> Vec<Group> {
        self.lock()
            .groups
            .iter()
            .filter(|g| g.members.iter().any(|m| m == user))
            .cloned()
            .collect()
    }

    /// Discovery listing: every group, annotated with the user's membership
    /// and pending-request status. Deliberately unfiltered.
    pub fn search(&self, user: &str) -> Vec<GroupWithStatus> {
        let inner = self.lock();
        inner
            .groups
            .iter()
            .map(|group| GroupWithStatus {
                is_member: group.members.iter().any(|m| m == user),
                has_pending_request: inner.requests.iter().any(|r| {
                    r.user == user && r.group_id == group.id && r.status == JoinStatus::Pending
                }),
                group: group.clone(),
            })
            .collect()
    }

    /// Pending requests are only disclosed to the group's admin.
    pub fn details(&self, group_id: u64, user: &str) -> AppResult<GroupDetails> {
        let inner = self.lock();
        let group = inner
            .groups
            .iter()
            .find(|g| g.id == group_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Group not found"))?;

        let is_admin = user == group.admin;
        let pending_requests = if is_admin {
            inner
                .requests
                .iter()
                .filter(|r| r.group_id == group_id && r.status == JoinStatus::Pending)
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        Ok(GroupDetails {
            group,
            is_admin,
            pending_requests,
        })
    }

    pub fn request_join(
        &self,
        group_id: u64,
        user: String,
        requested_at: Option<String>,
    ) -> AppResult<JoinRequest> {
        let mut inner = self.lock();
        let group = inner
            .groups
            .iter()
            .find(|g| g.id == group_id)
            .ok_or_else(|| AppError::not_found("Group not found"))?;

        if group.members.iter().any(|m| m == &user) {
            return Err(AppError::conflict("User is already a member of this group"));
        }
        if inner.requests.iter().any(|r| {
            r.user == user && r.group_id == group_id && r.status == JoinStatus::Pending
        }) {
            return Err(AppError::conflict("Join request already pending"));
        }

        let request = JoinRequest {
            id: inner.next_request_id,
            user,
            group_id,
            status: JoinStatus::Pending,
            requested_at: requested_at.unwrap_or_else(|| Utc::now().to_rfc3339()),
        };
        inner.next_request_id += 1;
        inner.requests.push(request.clone());
        self.storage.save("join_requests", &inner.requests)?;

        tracing::info!(group = group_id, user = %request.user, "join requested");
        Ok(request)
    }

    /// Appends the requester to the member list (idempotent against a
    /// double approval) and marks the request approved.
    pub fn approve_join(
        &self,
        group_id: u64,
        request_id: u64,
        admin_user: &str,
    ) -> AppResult<Group> {
        let mut inner = self.lock();
        let requester = {
            let request = inner
                .requests
                .iter()
                .find(|r| r.id == request_id)
                .ok_or_else(|| AppError::not_found("Join request not found"))?;
            request.user.clone()
        };

        let group = inner
            .groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or_else(|| AppError::not_found("Group not found"))?;
        if admin_user != group.admin {
            return Err(AppError::forbidden(
                "Only group admin can approve join requests",
            ));
        }

        if !group.members.iter().any(|m| m == &requester) {
            group.members.push(requester);
        }
        let group = group.clone();

        let request = inner
            .requests
            .iter_mut()
            .find(|r| r.id == request_id)
            .expect("request existed above");
        request.status = JoinStatus::Approved;

        self.storage.save("groups", &inner.groups)?;
        self.storage.save("join_requests", &inner.requests)?;

        tracing::info!(group = group_id, request = request_id, "join approved");
        Ok(group)
    }

    /// Marks the request rejected unconditionally; a request that already
    /// reached a terminal state is overwritten rather than refused.
    pub fn reject_join(&self, group_id: u64, request_id: u64, admin_user: &str) -> AppResult<()> {
        let mut inner = self.lock();
        if !inner.requests.iter().any(|r| r.id == request_id) {
            return Err(AppError::not_found("Join request not found"));
        }
        let group = inner
            .groups
            .iter()
            .find(|g| g.id == group_id)
            .ok_or_else(|| AppError::not_found("Group not found"))?;
        if admin_user != group.admin {
            return Err(AppError::forbidden(
                "Only group admin can reject join requests",
            ));
        }

        let request = inner
            .requests
            .iter_mut()
            .find(|r| r.id == request_id)
            .expect("request existed above");
        request.status = JoinStatus::Rejected;
        self.storage.save("join_requests", &inner.requests)?;

        tracing::info!(group = group_id, request = request_id, "join rejected");
        Ok(())
    }
}
