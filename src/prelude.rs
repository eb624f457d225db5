pub use {
    anyhow::{anyhow, bail, Error, Result},
    log::{debug, error, info, trace, warn},
    tokio::sync::broadcast,
};

pub use crate::{
    channels::Channels,
    config::{self, Config, ConfigWrapper},
    coordinator::{self, Coordinator},
    growatt::{self, dongle::Serial},
    mqtt,
    options::Options,
    register_cache::{self, Namespace, RegisterCache, Registers},
    utils::Utils,
};
