//! Database row models
//!
//! Plain row shapes as stored in SQLite. Entity behaviour (validation,
//! ordering, image decoding) lives in `vtour-core`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MarkerRow {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PhotoRow {
    pub id: String,
    pub marker_id: String,
    pub title: Option<String>,
    pub path: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub image_data: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Setting {
    pub key: String,
    pub value: String,
}
