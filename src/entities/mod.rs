pub mod access_keys;
pub mod users;

pub mod prelude {
    pub use super::access_keys::Entity as AccessKeys;
    pub use super::users::Entity as Users;
}
