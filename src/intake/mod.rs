pub mod broker;
pub mod channel_broker;
pub mod spool_broker;

pub use broker::{Delivery, JobBroker};
pub use channel_broker::ChannelBroker;
pub use spool_broker::SpoolBroker;
