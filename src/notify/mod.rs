pub mod dispatch;
pub mod email;
pub mod outbox;
pub mod sms;
