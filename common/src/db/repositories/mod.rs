// Repository layer

pub mod email_log;
pub mod subscription;
pub mod user;

pub use email_log::EmailLogRepository;
pub use subscription::SubscriptionRepository;
pub use user::UserRepository;
