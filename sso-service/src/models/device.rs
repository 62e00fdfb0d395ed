//! Device model - a (user, IP, user-agent) fingerprint that sessions bind to.

use chrono::{DateTime, Utc};
use isbot::Bots;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use std::net::Ipv4Addr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Device entity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema, PartialEq)]
pub struct Device {
    pub id: String,
    pub user_id: Uuid,
    pub name: String,
    pub device_type: String,
    pub os: String,
    pub browser: String,
    pub user_agent: String,
    pub ip: String,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Client fingerprint extracted from the request by the device gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFingerprint {
    pub ip: Ipv4Addr,
    pub user_agent: String,
}

impl DeviceFingerprint {
    pub fn new(ip: Ipv4Addr, user_agent: impl Into<String>) -> Self {
        Self {
            ip,
            user_agent: user_agent.into(),
        }
    }

    /// Stable id of this fingerprint for `user_id`.
    pub fn device_id(&self, user_id: Uuid) -> String {
        let mut hasher = Sha256::new();
        hasher.update(user_id.as_bytes());
        hasher.update(b"|");
        hasher.update(self.ip.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(self.user_agent.as_bytes());
        hex::encode(&hasher.finalize()[..8])
    }

    /// Build the device row this fingerprint resolves to.
    pub fn to_device(&self, user_id: Uuid) -> Device {
        let agent = UserAgentSummary::parse(&self.user_agent);
        let now = Utc::now();
        Device {
            id: self.device_id(user_id),
            user_id,
            name: format!("My {}", agent.device_type),
            device_type: agent.device_type.to_string(),
            os: agent.os.to_string(),
            browser: agent.browser.to_string(),
            user_agent: self.user_agent.clone(),
            ip: self.ip.to_string(),
            last_active: now,
            created_at: now,
        }
    }
}

/// Coarse classification of a user-agent string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgentSummary {
    pub device_type: &'static str,
    pub os: &'static str,
    pub browser: &'static str,
}

impl UserAgentSummary {
    pub fn parse(ua: &str) -> Self {
        if Bots::default().is_bot(ua) {
            return Self {
                device_type: "bot",
                os: "unknown",
                browser: "unknown",
            };
        }

        let os = if ua.contains("Windows") {
            "Windows"
        } else if ua.contains("iPhone") || ua.contains("iPad") {
            "iOS"
        } else if ua.contains("Mac OS X") || ua.contains("Macintosh") {
            "macOS"
        } else if ua.contains("Android") {
            "Android"
        } else if ua.contains("Linux") {
            "Linux"
        } else {
            "unknown"
        };

        // Order matters: Edge and Chrome both advertise Safari.
        let browser = if ua.contains("Edg/") {
            "Edge"
        } else if ua.contains("OPR/") || ua.contains("Opera") {
            "Opera"
        } else if ua.contains("Firefox/") {
            "Firefox"
        } else if ua.contains("Chrome/") {
            "Chrome"
        } else if ua.contains("Safari/") {
            "Safari"
        } else {
            "unknown"
        };

        let device_type = if ua.contains("iPad") || ua.contains("Tablet") {
            "tablet"
        } else if ua.contains("Mobile") || ua.contains("iPhone") || ua.contains("Android") {
            "mobile"
        } else if os == "unknown" {
            "device"
        } else {
            "desktop"
        };

        Self {
            device_type,
            os,
            browser,
        }
    }
}
