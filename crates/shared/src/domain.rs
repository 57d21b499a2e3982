use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub usize);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// Position among accepted sensations, which is what the device addresses.
id_newtype!(DeviceSlotIndex);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// A catalog record as authored in the sensation file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSensation {
    #[serde(default, alias = "Uuid")]
    pub uuid: String,
    #[serde(default, alias = "Description")]
    pub description: String,
    #[serde(default, alias = "Cost")]
    pub cost: String,
    #[serde(default, alias = "Prefix")]
    pub prefix: String,
    #[serde(
        default,
        rename = "sensation",
        alias = "Sensation",
        alias = "code",
        alias = "Code"
    )]
    pub code: String,
}

impl RawSensation {
    pub fn keyword(&self) -> String {
        format!("{}{}", self.prefix, self.cost)
    }
}
