//! Catalog models and the catalog store.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Modeling {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    pub price: i64,
    pub is_deleted: bool,
}

/// Filter for catalog listings; soft-deleted modelings are never listed
#[derive(Debug, Clone)]
pub struct ModelingFilter {
    pub name: Option<String>,
    pub price_min: i64,
    pub price_max: i64,
}

/// Query parameters of the catalog listing, kept as raw strings so that
/// non-numeric prices surface as validation errors instead of rejections
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelingListQuery {
    pub query: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelingListResponse {
    pub modelings: Vec<Modeling>,
    /// The caller's current draft, if authenticated and one exists
    pub draft_request_id: Option<i64>,
    pub draft_items: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateModelingRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: i64,
}

/// Sparse update; absent fields and empty strings leave the stored value untouched
#[derive(Debug, Default, Deserialize)]
pub struct UpdateModelingRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("modeling {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl Modeling {
    /// Find a modeling by id, including soft-deleted ones
    pub async fn find(pool: &SqlitePool, id: i64) -> Result<Modeling, CatalogError> {
        sqlx::query_as::<_, Modeling>("SELECT * FROM modelings WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(CatalogError::NotFound(id))
    }

    /// Find a modeling that has not been soft-deleted
    pub async fn find_live(pool: &SqlitePool, id: i64) -> Result<Modeling, CatalogError> {
        sqlx::query_as::<_, Modeling>("SELECT * FROM modelings WHERE id = ? AND is_deleted = 0")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(CatalogError::NotFound(id))
    }

    pub async fn list(pool: &SqlitePool, filter: &ModelingFilter) -> Result<Vec<Modeling>, sqlx::Error> {
        match filter.name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => {
                sqlx::query_as::<_, Modeling>(
                    r"SELECT * FROM modelings WHERE is_deleted = 0 AND name LIKE ? ESCAPE '\' AND price BETWEEN ? AND ? ORDER BY id",
                )
                .bind(format!("%{}%", escape_like(name)))
                .bind(filter.price_min)
                .bind(filter.price_max)
                .fetch_all(pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Modeling>(
                    "SELECT * FROM modelings WHERE is_deleted = 0 AND price BETWEEN ? AND ? ORDER BY id",
                )
                .bind(filter.price_min)
                .bind(filter.price_max)
                .fetch_all(pool)
                .await
            }
        }
    }

    pub async fn create(pool: &SqlitePool, req: &CreateModelingRequest) -> Result<Modeling, CatalogError> {
        let result = sqlx::query("INSERT INTO modelings (name, description, price) VALUES (?, ?, ?)")
            .bind(&req.name)
            .bind(&req.description)
            .bind(req.price)
            .execute(pool)
            .await?;

        Self::find(pool, result.last_insert_rowid()).await
    }

    pub async fn update(
        pool: &SqlitePool,
        id: i64,
        req: &UpdateModelingRequest,
    ) -> Result<Modeling, CatalogError> {
        let name = req.name.as_deref().filter(|s| !s.is_empty());
        let description = req.description.as_deref().filter(|s| !s.is_empty());

        let result = sqlx::query(
            r#"
            UPDATE modelings SET
                name = COALESCE(?, name),
                description = COALESCE(?, description),
                price = COALESCE(?, price)
            WHERE id = ? AND is_deleted = 0
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(req.price)
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(id));
        }
        Self::find(pool, id).await
    }

    /// Point the modeling at a new image, returning the URL it replaced
    pub async fn set_image(
        pool: &SqlitePool,
        id: i64,
        image_url: &str,
    ) -> Result<Option<String>, CatalogError> {
        let previous = Self::find_live(pool, id).await?.image_url;

        sqlx::query("UPDATE modelings SET image_url = ? WHERE id = ?")
            .bind(image_url)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(previous)
    }

    pub async fn soft_delete(pool: &SqlitePool, id: i64) -> Result<(), CatalogError> {
        let result = sqlx::query("UPDATE modelings SET is_deleted = 1 WHERE id = ? AND is_deleted = 0")
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(id));
        }
        Ok(())
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM modelings")
            .fetch_one(pool)
            .await
    }
}

/// Escape `LIKE` wildcards so the search term matches literally
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn new_modeling(name: &str, price: i64) -> CreateModelingRequest {
        CreateModelingRequest {
            name: name.to_string(),
            description: format!("{} description", name),
            price,
        }
    }

    fn all_prices() -> ModelingFilter {
        ModelingFilter {
            name: None,
            price_min: 0,
            price_max: i64::MAX,
        }
    }

    #[tokio::test]
    async fn test_list_filters_price_and_name() {
        let (pool, _dir) = test_pool().await;
        Modeling::create(&pool, &new_modeling("Queue in a node", 1500)).await.unwrap();
        Modeling::create(&pool, &new_modeling("Message transit", 5000)).await.unwrap();
        Modeling::create(&pool, &new_modeling("Queue simulation", 10000)).await.unwrap();

        let cheap = Modeling::list(
            &pool,
            &ModelingFilter {
                name: None,
                price_min: 0,
                price_max: 5000,
            },
        )
        .await
        .unwrap();
        assert_eq!(cheap.len(), 2);

        let queues = Modeling::list(
            &pool,
            &ModelingFilter {
                name: Some("Queue".to_string()),
                price_min: 2000,
                price_max: i64::MAX,
            },
        )
        .await
        .unwrap();
        assert_eq!(queues.len(), 1);
        assert_eq!(queues[0].name, "Queue simulation");
    }

    #[tokio::test]
    async fn test_name_search_treats_wildcards_literally() {
        let (pool, _dir) = test_pool().await;
        Modeling::create(&pool, &new_modeling("alpha", 100)).await.unwrap();
        Modeling::create(&pool, &new_modeling("beta", 100)).await.unwrap();
        Modeling::create(&pool, &new_modeling("load_100%", 100)).await.unwrap();

        let search = |name: &str| ModelingFilter {
            name: Some(name.to_string()),
            price_min: 0,
            price_max: i64::MAX,
        };

        let percent = Modeling::list(&pool, &search("%")).await.unwrap();
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].name, "load_100%");

        let underscore = Modeling::list(&pool, &search("d_1")).await.unwrap();
        assert_eq!(underscore.len(), 1);

        assert!(Modeling::list(&pool, &search("a_p")).await.unwrap().is_empty());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("plain"), "plain");
        assert_eq!(escape_like("50%_off"), r"50\%\_off");
        assert_eq!(escape_like(r"a\b"), r"a\\b");
    }

    #[tokio::test]
    async fn test_soft_delete_hides_from_list_but_stays_resolvable() {
        let (pool, _dir) = test_pool().await;
        let m = Modeling::create(&pool, &new_modeling("Losses", 12500)).await.unwrap();

        Modeling::soft_delete(&pool, m.id).await.unwrap();

        assert!(Modeling::list(&pool, &all_prices()).await.unwrap().is_empty());
        assert!(matches!(
            Modeling::find_live(&pool, m.id).await,
            Err(CatalogError::NotFound(_))
        ));
        assert!(Modeling::find(&pool, m.id).await.unwrap().is_deleted);

        // Deleting twice is a miss
        assert!(matches!(
            Modeling::soft_delete(&pool, m.id).await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sparse_update() {
        let (pool, _dir) = test_pool().await;
        let m = Modeling::create(&pool, &new_modeling("Waiting time", 10000)).await.unwrap();

        let updated = Modeling::update(
            &pool,
            m.id,
            &UpdateModelingRequest {
                name: Some(String::new()),
                description: None,
                price: Some(0),
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.name, "Waiting time");
        assert_eq!(updated.description, m.description);
        assert_eq!(updated.price, 0);
    }

    #[tokio::test]
    async fn test_set_image_returns_previous() {
        let (pool, _dir) = test_pool().await;
        let m = Modeling::create(&pool, &new_modeling("System time", 15000)).await.unwrap();

        let first = Modeling::set_image(&pool, m.id, "/images/a.png").await.unwrap();
        assert!(first.is_none());
        let second = Modeling::set_image(&pool, m.id, "/images/b.png").await.unwrap();
        assert_eq!(second.as_deref(), Some("/images/a.png"));
        assert_eq!(
            Modeling::find(&pool, m.id).await.unwrap().image_url.as_deref(),
            Some("/images/b.png")
        );
    }

    #[tokio::test]
    async fn test_negative_price_is_rejected_by_storage() {
        let (pool, _dir) = test_pool().await;
        let result = Modeling::create(&pool, &new_modeling("Broken", -1)).await;
        assert!(matches!(result, Err(CatalogError::Database(_))));
    }
}
