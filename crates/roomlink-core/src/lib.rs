//! Core helpers shared by the roomlink crates: tracing setup, request ids,
//! meeting URLs.

pub mod ids;
pub mod meeting;
pub mod tracing;

pub use ids::{IdGenerator, SequentialIds, UuidGenerator};
pub use meeting::{MeetingUrl, MeetingUrlError, UserInfo, meeting_id_from_url};
pub use crate::tracing::{
    MESSENGER_TARGET, TracingConfig, TracingError, TracingOutputFormat, init_tracing,
};
