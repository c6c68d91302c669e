//! Database seeders for built-in data
//!
//! Seeds the standard network modeling catalog and the bootstrap admin account.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::info;

use super::{Modeling, User};

/// Insert the standard modelings when the catalog is empty.
///
/// Unlike a template refresh this never touches an existing catalog, since
/// admins edit prices and images after the first start.
pub async fn seed_modelings(pool: &SqlitePool) -> Result<()> {
    if Modeling::count(pool).await? > 0 {
        return Ok(());
    }

    info!("Seeding the modeling catalog...");

    // (name, description, image, price)
    let modelings: Vec<(&str, &str, &str, i64)> = vec![
        (
            "Analytical modeling of a queue in a network node",
            "Computes the expected waiting time in a single network node.",
            "/images/card1.jpg",
            1500,
        ),
        (
            "Analytical modeling of message transit through a network",
            "Computes the mean time for a message to traverse the network.",
            "/images/card2.jpeg",
            5000,
        ),
        (
            "Simulation of queues",
            "Collects queue statistics: mean length, peak length and standard deviation of the length.",
            "/images/card3.png",
            10000,
        ),
        (
            "Simulation of waiting time",
            "Collects waiting time statistics: mean, maximum and standard deviation.",
            "/images/card4.png",
            10000,
        ),
        (
            "Simulation of system time",
            "Collects system time statistics: mean, maximum, standard deviation, message count in the sample, peak and deviation of in-system messages.",
            "/images/card5.jpeg",
            15000,
        ),
        (
            "Simulation of message losses",
            "Collects loss statistics: total lost messages, loss rate, and the share of losses from queue overflow and from timeouts.",
            "/images/card6.png",
            12500,
        ),
    ];

    let count = modelings.len();
    for (name, description, image, price) in modelings {
        sqlx::query("INSERT INTO modelings (name, description, image_url, price) VALUES (?, ?, ?, ?)")
            .bind(name)
            .bind(description)
            .bind(image)
            .bind(price)
            .execute(pool)
            .await?;
    }

    info!("Seeded {} modelings", count);
    Ok(())
}

/// Create the configured admin account unless a user with that login exists.
///
/// Without a configured password nothing is created.
pub async fn ensure_admin_user(
    pool: &SqlitePool,
    login: &str,
    password: Option<&str>,
    name: &str,
) -> Result<()> {
    let Some(password) = password else {
        info!("No admin password configured, skipping admin bootstrap");
        return Ok(());
    };

    if User::find_by_login(pool, login).await?.is_some() {
        return Ok(());
    }

    User::create(pool, login, password, name, true)
        .await
        .with_context(|| format!("Failed to create admin user {}", login))?;
    info!("Created admin user: {}", login);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_seed_only_fills_empty_catalog() {
        let (pool, _dir) = test_pool().await;
        seed_modelings(&pool).await.unwrap();
        assert_eq!(Modeling::count(&pool).await.unwrap(), 6);

        seed_modelings(&pool).await.unwrap();
        assert_eq!(Modeling::count(&pool).await.unwrap(), 6);

        let third = Modeling::find(&pool, 3).await.unwrap();
        assert_eq!(third.price, 10000);
    }

    #[tokio::test]
    async fn test_ensure_admin_user_is_idempotent() {
        let (pool, _dir) = test_pool().await;
        ensure_admin_user(&pool, "admin", Some("admin-password"), "Admin")
            .await
            .unwrap();
        ensure_admin_user(&pool, "admin", Some("different"), "Admin")
            .await
            .unwrap();

        let admin = User::find_by_credentials(&pool, "admin", "admin-password")
            .await
            .unwrap();
        assert!(admin.is_admin);
    }

    #[tokio::test]
    async fn test_ensure_admin_user_without_password() {
        let (pool, _dir) = test_pool().await;
        ensure_admin_user(&pool, "admin", None, "Admin").await.unwrap();
        assert!(User::find_by_login(&pool, "admin").await.unwrap().is_none());
    }
}
