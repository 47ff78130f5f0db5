pub use anyhow::{anyhow, bail, Error, Result};
pub use log::{debug, error, info, trace, warn};

pub use tokio::sync::broadcast;

pub use std::io::Write;

pub use crate::channels::Channels;
pub use crate::config::{self, Config, ConfigWrapper};
pub use crate::coordinator;
pub use crate::error::DecodeError;
pub use crate::growatt::{self, Frame, MessageKind, TelemetryRecord};
pub use crate::metrics;
pub use crate::mqtt;
pub use crate::options::Options;
