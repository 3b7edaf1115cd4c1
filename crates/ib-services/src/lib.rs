//! # ib-services
//!
//! The post lifecycle engine: PIN ownership, content filtering, attachment
//! bookkeeping and the post operations the API exposes. Everything here talks
//! to storage through the `ib-core` ports, so it runs unchanged against any
//! plugin set (or mocks).

pub mod attachments;
pub mod filter;
pub mod pin;
pub mod posts;

pub use attachments::AttachmentCoordinator;
pub use filter::WordListFilter;
pub use pin::{IssuedPin, PinAuthority};
pub use posts::PostService;
