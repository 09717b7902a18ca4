pub mod queued_request;

pub use queued_request::{QueueCounts, QueuedDeliveryRequest};
