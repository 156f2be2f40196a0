use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::image;

/// Page size applied when a caller passes `limit == 0`. Listing is never
/// unbounded.
pub const DEFAULT_PAGE_SIZE: u64 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: Uuid,
    pub prompt: String,
    pub filename: String,
    pub size_bytes: i64,
    pub width: i32,
    pub height: i32,
    pub created_at: DateTime<Utc>,
    /// Serving path for the raw bytes, derived from `filename`.
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateImage {
    pub prompt: String,
    pub filename: String,
    pub size_bytes: i64,
    pub width: i32,
    pub height: i32,
}

impl Image {
    fn from_model(model: image::Model) -> Self {
        let url = format!("/api/images/{}", model.filename);
        Self {
            id: model.uuid,
            prompt: model.prompt,
            filename: model.filename,
            size_bytes: model.size_bytes,
            width: model.width,
            height: model.height,
            created_at: model.created_at,
            url,
        }
    }

    pub async fn create<C: ConnectionTrait>(db: &C, data: &CreateImage) -> Result<Self, DbErr> {
        let active = image::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            prompt: Set(data.prompt.clone()),
            filename: Set(data.filename.clone()),
            size_bytes: Set(data.size_bytes),
            width: Set(data.width),
            height: Set(data.height),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Ok(Self::from_model(model))
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = image::Entity::find()
            .filter(image::Column::Uuid.eq(id))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    /// Newest-first page of records. `skip` rows are dropped from the head;
    /// id breaks ties between equal timestamps so pages never overlap.
    pub async fn list<C: ConnectionTrait>(
        db: &C,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Self>, DbErr> {
        let limit = if limit == 0 { DEFAULT_PAGE_SIZE } else { limit };
        let records = image::Entity::find()
            .order_by_desc(image::Column::CreatedAt)
            .order_by_desc(image::Column::Id)
            .offset(skip)
            .limit(limit)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    /// Remove one record. Returns whether a row was deleted; an unknown id is
    /// not an error. Single statement, so a concurrent cleanup racing on the
    /// same row leaves one caller with a no-op rather than corrupt state.
    pub async fn delete_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<bool, DbErr> {
        let result = image::Entity::delete_many()
            .filter(image::Column::Uuid.eq(id))
            .exec(db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Delete every record older than `cutoff` and return the removed
    /// records so the caller can clean up their backing files. The delete is
    /// one statement over the same predicate as the select; rows created
    /// afterwards carry newer timestamps and cannot enter the window.
    pub async fn delete_older_than<C: ConnectionTrait>(
        db: &C,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Self>, DbErr> {
        let expired = image::Entity::find()
            .filter(image::Column::CreatedAt.lt(cutoff))
            .all(db)
            .await?;
        if expired.is_empty() {
            return Ok(Vec::new());
        }

        image::Entity::delete_many()
            .filter(image::Column::CreatedAt.lt(cutoff))
            .exec(db)
            .await?;

        Ok(expired.into_iter().map(Self::from_model).collect())
    }

    pub async fn count<C: ConnectionTrait>(db: &C) -> Result<u64, DbErr> {
        image::Entity::find().count(db).await
    }

    pub async fn total_size_bytes<C: ConnectionTrait>(db: &C) -> Result<i64, DbErr> {
        let total: Option<Option<i64>> = image::Entity::find()
            .select_only()
            .column_as(image::Column::SizeBytes.sum(), "total")
            .into_tuple()
            .one(db)
            .await?;
        Ok(total.flatten().unwrap_or(0))
    }
}
