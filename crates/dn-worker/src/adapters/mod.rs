pub mod email;
pub mod push;

pub use email::EmailAdapter;
pub use push::PushAdapter;
