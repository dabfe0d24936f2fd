use sea_orm::{entity::prelude::*, Set, ConnectionTrait};
use uuid::Uuid;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: String,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    pub request_id: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef { panic!("no relations defined here") }
}

impl ActiveModelBehavior for ActiveModel {}

pub struct NewNotification<'a> {
    pub recipient_id: Uuid,
    pub kind: &'a str,
    pub title: &'a str,
    pub message: &'a str,
    pub request_id: Option<Uuid>,
}

pub async fn create<C: ConnectionTrait>(db: &C, input: NewNotification<'_>) -> Result<Model, errors::ModelError> {
    if input.kind.trim().is_empty() { return Err(errors::ModelError::Validation("kind required".into())); }
    if input.title.chars().count() > 128 { return Err(errors::ModelError::Validation("title too long".into())); }
    let am = ActiveModel {
        id: Set(Uuid::new_v4()),
        recipient_id: Set(input.recipient_id),
        kind: Set(input.kind.to_string()),
        title: Set(input.title.to_string()),
        message: Set(input.message.to_string()),
        request_id: Set(input.request_id),
        read: Set(false),
        created_at: Set(Utc::now().into()),
    };
    am.insert(db).await.map_err(|e| errors::ModelError::Db(e.to_string()))
}

pub async fn list_for_recipient<C: ConnectionTrait>(db: &C, recipient_id: Uuid) -> Result<Vec<Model>, errors::ModelError> {
    Entity::find()
        .filter(Column::RecipientId.eq(recipient_id))
        .all(db)
        .await
        .map_err(|e| errors::ModelError::Db(e.to_string()))
}
