use async_trait::async_trait;
use uuid::Uuid;

use super::rows::{ResourceRow, RESOURCE_COLUMNS};
use super::ConnectionPool;
use crate::models::resource::Resource;
use crate::repository::ResourceRepository;
use crate::utils::error::AppResult;

pub struct ResourceRepositoryImpl {
    db: ConnectionPool,
}

impl ResourceRepositoryImpl {
    pub fn new(db: ConnectionPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ResourceRepository for ResourceRepositoryImpl {
    async fn find_by_id(&self, resource_id: Uuid) -> AppResult<Option<Resource>> {
        let row: Option<ResourceRow> = sqlx::query_as(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = $1"
        ))
        .bind(resource_id)
        .fetch_optional(self.db.inner_ref())
        .await?;

        row.map(Resource::try_from).transpose()
    }
}
