pub(crate) use {
    std::{
        collections::{
            HashMap,
            HashSet,
        },
        fmt,
        path::{
            Path,
            PathBuf,
        },
        sync::Arc,
        time::Duration,
    },
    serde::{
        Deserialize,
        Serialize,
    },
    tokio::time::{
        Instant,
        sleep,
        sleep_until,
    },
};
