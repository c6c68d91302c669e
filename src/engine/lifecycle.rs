//! Analysis request lifecycle and draft cart.
//!
//! Every user has at most one draft request, which acts as a cart of
//! modelings with per-item parameters. The draft is submitted by its owner
//! and then resolved by an admin:
//!
//! ```text
//! draft -> registered -> complete | canceled
//! draft -> deleted
//! ```
//!
//! The one-draft rule is held by a partial unique index on
//! `analysis_requests(owner_id) WHERE status = 'draft'`, and duplicate cart
//! items by the primary key of `request_modelings`. Storage errors are
//! translated into [`LifecycleError`] here and never leak past this module.

use chrono::Duration;
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;
use tracing::{info, warn};

use crate::api::metrics::{DRAFTS_CREATED_TOTAL, REQUEST_TRANSITIONS_TOTAL};
use crate::auth::Caller;
use crate::db::{
    format_timestamp, is_unique_violation, now_timestamp, AnalysisRequest, AssociationPatch,
    ModelingView, RequestFilter, RequestStatus, RequestView, Resolution,
};

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("analysis request {0} not found")]
    NotFound(i64),

    #[error("modeling {0} is not in the catalog")]
    UnknownModeling(i64),

    #[error("modeling {0} is already in the draft")]
    DuplicateAssociation(i64),

    #[error("modeling {0} is not in the draft")]
    AssociationNotFound(i64),

    #[error("no active draft")]
    NoActiveDraft,

    #[error("cannot move a {from} request to {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("access to analysis request {0} is denied")]
    AccessDenied(i64),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

const REQUEST_SELECT: &str = r#"
    SELECT r.id, r.owner_id, o.login AS owner_login, r.status, r.created_at, r.formed_at,
           r.completed_at, r.admin_id, a.login AS admin_login
    FROM analysis_requests r
    LEFT JOIN users o ON o.id = r.owner_id
    LEFT JOIN users a ON a.id = r.admin_id
"#;

enum Binding {
    Int(i64),
    Text(String),
}

#[derive(Clone)]
pub struct RequestLifecycle {
    db: SqlitePool,
}

impl RequestLifecycle {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Return the user's draft id, creating the draft if there is none
    pub async fn get_or_create_draft(&self, user_id: i64) -> Result<i64> {
        let mut tx = self.db.begin().await?;
        let request_id = ensure_draft(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(request_id)
    }

    /// The user's draft id, if any
    pub async fn current_draft(&self, user_id: i64) -> Result<Option<i64>> {
        Ok(find_draft_id(&self.db, user_id).await?)
    }

    /// Draft id and the number of modelings in it
    pub async fn draft_summary(&self, user_id: i64) -> Result<(Option<i64>, i64)> {
        let Some(request_id) = find_draft_id(&self.db, user_id).await? else {
            return Ok((None, 0));
        };
        let items: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM request_modelings WHERE request_id = ?")
                .bind(request_id)
                .fetch_one(&self.db)
                .await?;
        Ok((Some(request_id), items))
    }

    pub async fn add_modeling_to_draft(&self, user_id: i64, modeling_id: i64) -> Result<()> {
        // The draft insert comes first so the transaction holds the write lock
        // from its first statement. An early return rolls a new draft back.
        let mut tx = self.db.begin().await?;
        let request_id = ensure_draft(&mut tx, user_id).await?;

        let live: Option<i64> =
            sqlx::query_scalar("SELECT id FROM modelings WHERE id = ? AND is_deleted = 0")
                .bind(modeling_id)
                .fetch_optional(&mut *tx)
                .await?;
        if live.is_none() {
            return Err(LifecycleError::UnknownModeling(modeling_id));
        }

        sqlx::query("INSERT INTO request_modelings (request_id, modeling_id) VALUES (?, ?)")
            .bind(request_id)
            .bind(modeling_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    LifecycleError::DuplicateAssociation(modeling_id)
                } else {
                    LifecycleError::Storage(e)
                }
            })?;

        tx.commit().await?;
        info!(user_id, request_id, modeling_id, "Modeling added to draft");
        Ok(())
    }

    /// Merge the supplied parameters into a draft item; absent fields keep their value
    pub async fn update_association_parameters(
        &self,
        user_id: i64,
        modeling_id: i64,
        patch: &AssociationPatch,
    ) -> Result<()> {
        for (field, value) in [
            ("node_quantity", patch.node_quantity),
            ("queue_size", patch.queue_size),
            ("client_quantity", patch.client_quantity),
        ] {
            if matches!(value, Some(v) if v < 0) {
                return Err(LifecycleError::Validation(format!(
                    "{} must not be negative",
                    field
                )));
            }
        }

        // The draft is resolved inside the statement so a concurrent submit
        // cannot slip between the lookup and the write
        let result = sqlx::query(
            r#"
            UPDATE request_modelings SET
                node_quantity = COALESCE(?, node_quantity),
                queue_size = COALESCE(?, queue_size),
                client_quantity = COALESCE(?, client_quantity)
            WHERE modeling_id = ?
              AND request_id = (
                  SELECT id FROM analysis_requests WHERE owner_id = ? AND status = 'draft'
              )
            "#,
        )
        .bind(patch.node_quantity)
        .bind(patch.queue_size)
        .bind(patch.client_quantity)
        .bind(modeling_id)
        .bind(user_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return match find_draft_id(&self.db, user_id).await? {
                Some(_) => Err(LifecycleError::AssociationNotFound(modeling_id)),
                None => Err(LifecycleError::NoActiveDraft),
            };
        }
        Ok(())
    }

    /// Drop a modeling from the draft and return the refreshed draft
    pub async fn remove_modeling_from_draft(
        &self,
        user_id: i64,
        modeling_id: i64,
    ) -> Result<RequestView> {
        let request_id = find_draft_id(&self.db, user_id)
            .await?
            .ok_or(LifecycleError::NoActiveDraft)?;

        let result = sqlx::query(
            r#"
            DELETE FROM request_modelings
            WHERE request_id = ? AND modeling_id = ?
              AND EXISTS (SELECT 1 FROM analysis_requests WHERE id = ? AND status = 'draft')
            "#,
        )
        .bind(request_id)
        .bind(modeling_id)
        .bind(request_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LifecycleError::AssociationNotFound(modeling_id));
        }

        info!(user_id, request_id, modeling_id, "Modeling removed from draft");
        self.compose(request_id).await
    }

    /// draft -> registered, stamping the formation time. Returns the submitted request id.
    pub async fn submit_draft(&self, user_id: i64) -> Result<i64> {
        let request_id: i64 = sqlx::query_scalar(
            "UPDATE analysis_requests SET status = 'registered', formed_at = ? WHERE owner_id = ? AND status = 'draft' RETURNING id",
        )
        .bind(now_timestamp())
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(LifecycleError::NoActiveDraft)?;

        record_transition(RequestStatus::Registered);
        info!(user_id, request_id, "Draft submitted");
        Ok(request_id)
    }

    /// registered -> complete | canceled, recording the acting admin
    pub async fn resolve_by_admin(
        &self,
        request_id: i64,
        admin_id: i64,
        outcome: Resolution,
    ) -> Result<()> {
        let target = outcome.status();
        let current = self.find(request_id).await?.status_enum();
        if !current.can_transition_to(target) {
            warn!(request_id, from = %current, to = %target, "Rejected request resolution");
            return Err(LifecycleError::InvalidTransition {
                from: current,
                to: target,
            });
        }

        let completed_at = (outcome == Resolution::Complete).then(now_timestamp);
        let result = sqlx::query(
            r#"
            UPDATE analysis_requests SET
                status = ?,
                admin_id = ?,
                completed_at = COALESCE(?, completed_at)
            WHERE id = ? AND status = 'registered'
            "#,
        )
        .bind(target.as_str())
        .bind(admin_id)
        .bind(completed_at)
        .bind(request_id)
        .execute(&self.db)
        .await?;

        // Another admin resolved it between the read and the update
        if result.rows_affected() == 0 {
            let current = self.find(request_id).await?.status_enum();
            warn!(request_id, from = %current, to = %target, "Rejected request resolution");
            return Err(LifecycleError::InvalidTransition {
                from: current,
                to: target,
            });
        }

        record_transition(target);
        info!(request_id, admin_id, status = %target, "Request resolved");
        Ok(())
    }

    /// draft -> deleted; the row is kept. Returns the deleted request id.
    pub async fn delete_draft(&self, user_id: i64) -> Result<i64> {
        let request_id: i64 = sqlx::query_scalar(
            "UPDATE analysis_requests SET status = 'deleted' WHERE owner_id = ? AND status = 'draft' RETURNING id",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(LifecycleError::NoActiveDraft)?;

        record_transition(RequestStatus::Deleted);
        info!(user_id, request_id, "Draft deleted");
        Ok(request_id)
    }

    /// Submitted requests visible to the caller, newest formation first
    pub async fn list_requests(
        &self,
        filter: &RequestFilter,
        caller: &Caller,
    ) -> Result<Vec<AnalysisRequest>> {
        if let (Some(from), Some(to)) = (filter.formed_from, filter.formed_to) {
            if to < from {
                return Err(LifecycleError::Validation(
                    "End of the date range is before its start".to_string(),
                ));
            }
        }
        if matches!(filter.status, Some(status) if !status.is_listed()) {
            return Ok(Vec::new());
        }

        let mut conditions = vec!["r.status NOT IN ('draft', 'deleted')".to_string()];
        let mut bindings = Vec::new();

        if !caller.is_admin {
            conditions.push("r.owner_id = ?".to_string());
            bindings.push(Binding::Int(caller.user_id));
        }

        if let Some(status) = filter.status {
            conditions.push("r.status = ?".to_string());
            bindings.push(Binding::Text(status.as_str().to_string()));
        }

        if let Some(from) = filter.formed_from {
            conditions.push("r.formed_at >= ?".to_string());
            bindings.push(Binding::Text(format_timestamp(from)));
        }

        if let Some(to) = filter.formed_to {
            // The bound covers its whole second
            conditions.push("r.formed_at <= ?".to_string());
            bindings.push(Binding::Text(format_timestamp(
                to + Duration::microseconds(999_999),
            )));
        }

        let sql = format!(
            "{} WHERE {} ORDER BY r.formed_at DESC, r.id DESC",
            REQUEST_SELECT,
            conditions.join(" AND ")
        );
        let mut query = sqlx::query_as::<_, AnalysisRequest>(&sql);
        for binding in &bindings {
            query = match binding {
                Binding::Int(v) => query.bind(*v),
                Binding::Text(s) => query.bind(s.as_str()),
            };
        }

        Ok(query.fetch_all(&self.db).await?)
    }

    /// A request with its modelings, visible to its owner and to admins
    pub async fn get_request_view(&self, request_id: i64, caller: &Caller) -> Result<RequestView> {
        let request = self.find(request_id).await?;
        if !caller.is_admin && request.owner_id != caller.user_id {
            warn!(request_id, user_id = caller.user_id, "Denied access to request");
            return Err(LifecycleError::AccessDenied(request_id));
        }

        let modelings = self.modelings_of(request_id).await?;
        Ok(RequestView { request, modelings })
    }

    /// The caller's draft with its modelings
    pub async fn current_draft_view(&self, user_id: i64) -> Result<RequestView> {
        let request_id = find_draft_id(&self.db, user_id)
            .await?
            .ok_or(LifecycleError::NoActiveDraft)?;
        self.compose(request_id).await
    }

    async fn find(&self, request_id: i64) -> Result<AnalysisRequest> {
        sqlx::query_as::<_, AnalysisRequest>(&format!("{} WHERE r.id = ?", REQUEST_SELECT))
            .bind(request_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(LifecycleError::NotFound(request_id))
    }

    async fn compose(&self, request_id: i64) -> Result<RequestView> {
        let request = self.find(request_id).await?;
        let modelings = self.modelings_of(request_id).await?;
        Ok(RequestView { request, modelings })
    }

    /// Join the request's items against the catalog, soft-deleted modelings included
    async fn modelings_of(&self, request_id: i64) -> Result<Vec<ModelingView>> {
        Ok(sqlx::query_as::<_, ModelingView>(
            r#"
            SELECT m.id AS modeling_id, m.name, m.description, m.image_url, m.price, m.is_deleted,
                   rm.node_quantity, rm.queue_size, rm.client_quantity
            FROM request_modelings rm
            JOIN modelings m ON m.id = rm.modeling_id
            WHERE rm.request_id = ?
            ORDER BY m.id
            "#,
        )
        .bind(request_id)
        .fetch_all(&self.db)
        .await?)
    }
}

/// Insert-if-absent against the one-draft index, then read the draft back.
/// Run inside a transaction so the draft cannot change between the two.
async fn ensure_draft(conn: &mut SqliteConnection, user_id: i64) -> sqlx::Result<i64> {
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO analysis_requests (owner_id, status, created_at) VALUES (?, 'draft', ?)",
    )
    .bind(user_id)
    .bind(now_timestamp())
    .execute(&mut *conn)
    .await?;

    if inserted.rows_affected() > 0 {
        metrics::counter!(DRAFTS_CREATED_TOTAL).increment(1);
        info!(user_id, "Draft created");
    }

    sqlx::query_scalar("SELECT id FROM analysis_requests WHERE owner_id = ? AND status = 'draft'")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await
}

async fn find_draft_id(db: &SqlitePool, user_id: i64) -> sqlx::Result<Option<i64>> {
    sqlx::query_scalar("SELECT id FROM analysis_requests WHERE owner_id = ? AND status = 'draft'")
        .bind(user_id)
        .fetch_optional(db)
        .await
}

fn record_transition(to: RequestStatus) {
    metrics::counter!(REQUEST_TRANSITIONS_TOTAL, "status" => to.as_str()).increment(1);
}
