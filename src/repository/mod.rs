pub mod db;
pub mod models;

pub use models::{CommunityRecord, LoginTokenRecord, LoginTokenState, MemberRecord};
