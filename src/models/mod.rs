//! Data models for the doclink client library.
//!
//! Defines the request/response/notification frames exchanged with the
//! backend, session configuration, and the read-only snapshots handed to
//! callers.

pub mod connection_options;
pub mod connection_state;
pub mod error_detail;
pub mod inbound;
pub mod notification;
pub mod query_options;
pub mod queue_policy;
pub mod request;
pub mod response;
pub mod room_info;
pub mod subscribe_options;

pub use connection_options::ConnectionOptions;
pub use connection_state::ConnectionState;
pub use error_detail::ErrorDetail;
pub use inbound::Inbound;
pub(crate) use inbound::parse_frame;
pub use notification::{Notification, NotificationType};
pub use query_options::QueryOptions;
pub use queue_policy::QueuePolicy;
pub use request::Request;
pub use response::Response;
pub use room_info::{RoomInfo, RoomState};
pub use subscribe_options::{SubscribeOptions, SubscribeScope, UserScope};
