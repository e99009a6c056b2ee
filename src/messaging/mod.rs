mod broker;
mod kafka;
mod memory;
mod publisher;

pub use broker::{
    dead_letter_queue, handler, BrokerError, MessageBroker, MessageHandler, Subscription,
    DEAD_LETTER_SUFFIX,
};
pub use kafka::KafkaBroker;
pub use memory::InMemoryBroker;
pub use publisher::{EventPublisher, PublishError};
