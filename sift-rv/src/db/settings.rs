//! Settings database access
//!
//! Read/write settings from the settings table (key-value store).
//! All settings are global/system-wide.

use sift_common::{Error, Result};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

/// Default sliding window for the label density curve
pub const DEFAULT_DENSITY_WINDOW: usize = 10;

/// Default sample size for prior screening candidates
pub const DEFAULT_PRIOR_RANDOM_N: usize = 5;

/// Initialize settings table with default values
pub async fn init_settings_defaults(pool: &SqlitePool) -> Result<()> {
    let defaults = vec![
        // Sliding window (in reviewed documents) for progress_density
        ("progress_density_window", "10"),
        // Number of candidates returned by prior_random
        ("prior_random_default_n", "5"),
    ];

    for (key, default_value) in defaults {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
                .bind(key)
                .fetch_one(pool)
                .await?;

        if !exists {
            sqlx::query("INSERT INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;

            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
    }

    Ok(())
}

/// Get a typed setting value, None if unset
pub async fn get_setting<T: FromStr>(pool: &SqlitePool, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match value {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("setting '{}' has unparseable value: {}", key, raw))),
        None => Ok(None),
    }
}

/// Set a setting value
pub async fn set_setting<T: ToString>(pool: &SqlitePool, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Get the label density sliding window size
pub async fn get_density_window(pool: &SqlitePool) -> Result<usize> {
    Ok(get_setting::<usize>(pool, "progress_density_window")
        .await?
        .unwrap_or(DEFAULT_DENSITY_WINDOW))
}

/// Get the prior_random default sample size
pub async fn get_prior_random_n(pool: &SqlitePool) -> Result<usize> {
    Ok(get_setting::<usize>(pool, "prior_random_default_n")
        .await?
        .unwrap_or(DEFAULT_PRIOR_RANDOM_N))
}
