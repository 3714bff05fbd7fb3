mod stop;
mod subscribers;

pub use stop::StopHandle;
pub use subscribers::{SubscriberRegistry, SubscriptionId};
