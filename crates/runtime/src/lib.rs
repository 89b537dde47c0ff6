pub mod bus;
pub mod dispatcher;
pub mod events;
pub mod handlers;
pub mod hub;
pub mod metrics;

pub use bus::{BusError, CommandBus, CommandHandler, ExecutionLogEntry, LogOutcome, Middleware};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use events::HubMessage;
pub use handlers::{HudController, register_default_handlers};
pub use hub::{BroadcastReport, ChannelSubscriber, Hub, Subscriber, SubscriberId, SubscriberSendFailed};
pub use metrics::{Counters, LatencySummary, Metrics, MetricsSnapshot, percentile};
