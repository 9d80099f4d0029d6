use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Usernames are case-sensitive and double as the account identity.
    #[sea_orm(primary_key, auto_increment = false)]
    pub username: String,

    /// Hex-encoded bcrypt digest, never plaintext.
    pub hashed_password: String,

    pub is_admin: bool,

    /// Quota ceiling; 0 means unlimited.
    pub max_requests: i64,

    /// Monotonic global usage counter across all of the user's keys.
    pub request_count: i64,

    /// Either "free" or "premium".
    pub account_type: String,

    pub is_active: bool,

    /// Empty once consumed; unique among non-empty values.
    pub activation_token: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::access_keys::Entity")]
    AccessKeys,
}

impl Related<super::access_keys::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AccessKeys.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
