use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct Channels {
    pub from_proxy: broadcast::Sender<crate::proxy::ChannelData>,
    pub to_mqtt: broadcast::Sender<crate::mqtt::ChannelData>,
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}

impl Channels {
    pub fn new() -> Self {
        Self {
            from_proxy: Self::channel(),
            to_mqtt: Self::channel(),
        }
    }

    fn channel<T: Clone>() -> broadcast::Sender<T> {
        broadcast::channel(2048).0
    }
}
