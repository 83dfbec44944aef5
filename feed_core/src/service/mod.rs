pub mod comments;
pub mod identities;
pub mod notifications;
pub mod posts;
pub mod shares;
pub mod stories;
pub mod users;
