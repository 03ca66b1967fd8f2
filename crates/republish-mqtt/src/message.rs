use bytes::Bytes;

/// A message received from the broker, handed to the ingress queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Work for the egress task, drained in FIFO order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    Publish {
        topic: String,
        payload: Bytes,
        retain: bool,
    },
    Subscribe {
        filter: String,
    },
    Unsubscribe {
        filter: String,
    },
}

impl TransportCommand {
    pub fn publish(topic: impl Into<String>, payload: impl Into<Bytes>, retain: bool) -> Self {
        Self::Publish {
            topic: topic.into(),
            payload: payload.into(),
            retain,
        }
    }

    pub fn subscribe(filter: impl Into<String>) -> Self {
        Self::Subscribe {
            filter: filter.into(),
        }
    }

    pub fn unsubscribe(filter: impl Into<String>) -> Self {
        Self::Unsubscribe {
            filter: filter.into(),
        }
    }

    /// Topic or filter this command targets.
    pub fn topic(&self) -> &str {
        match self {
            Self::Publish { topic, .. } => topic,
            Self::Subscribe { filter } | Self::Unsubscribe { filter } => filter,
        }
    }
}
