//! Protocol constants isolated behind small lookups so a device family can
//! substitute its own without touching the compiler.

use droidwall_config::constants::{interfaces, log};

use super::model::TrafficClass;

/// Interface-name prefixes that classify outbound traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceProfile {
    wifi: Vec<String>,
    mobile: Vec<String>,
}

impl Default for InterfaceProfile {
    fn default() -> Self {
        Self::new(interfaces::WIFI, interfaces::MOBILE)
    }
}

impl InterfaceProfile {
    pub fn new(wifi: &[&str], mobile: &[&str]) -> Self {
        Self {
            wifi: wifi.iter().map(|prefix| (*prefix).to_string()).collect(),
            mobile: mobile.iter().map(|prefix| (*prefix).to_string()).collect(),
        }
    }

    pub fn prefixes(&self, class: TrafficClass) -> &[String] {
        match class {
            TrafficClass::Wifi => &self.wifi,
            TrafficClass::Mobile => &self.mobile,
        }
    }
}

/// Tag and keys of the reject chain's kernel log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFormat {
    pub prefix: String,
    pub tag: String,
    pub grep_token: String,
    pub uid_key: String,
    pub dst_key: String,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self {
            prefix: log::PREFIX.to_string(),
            tag: log::TAG.to_string(),
            grep_token: log::GREP_TOKEN.to_string(),
            uid_key: log::UID_KEY.to_string(),
            dst_key: log::DST_KEY.to_string(),
        }
    }
}
