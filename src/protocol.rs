//! Ring Protocol
//!
//! Defines the records nodes pass around the ring. Each record is a single
//! JSON object terminated by a newline:
//!
//! ```text
//! {"uuid":"6f1c...","flag":0}\n
//! ```
//!
//! `flag` is 0 for a plain election token and 1 for a leader announcement.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::NodeId;

/// Record delimiter on the wire
pub const RECORD_DELIMITER: char = '\n';

/// Flag value for a plain election token
pub const FLAG_ELECTION: u8 = 0;

/// Flag value for a leader announcement
pub const FLAG_ANNOUNCEMENT: u8 = 1;

/// A token travelling around the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    /// Identity carried by this message
    pub token: NodeId,
    /// Set when the token names the elected leader
    pub announcement: bool,
}

/// On-the-wire shape of a message
#[derive(Debug, Serialize, Deserialize)]
struct WireRecord {
    uuid: NodeId,
    flag: u8,
}

impl Message {
    /// Plain election token
    pub fn election(token: NodeId) -> Self {
        Self {
            token,
            announcement: false,
        }
    }

    /// Leader announcement
    pub fn announcement(leader: NodeId) -> Self {
        Self {
            token: leader,
            announcement: true,
        }
    }

    /// Numeric flag as it appears on the wire
    pub fn flag(&self) -> u8 {
        if self.announcement {
            FLAG_ANNOUNCEMENT
        } else {
            FLAG_ELECTION
        }
    }

    /// Encode as a newline-terminated record
    pub fn encode(&self) -> Result<String> {
        let mut line = self.encode_record()?;
        line.push(RECORD_DELIMITER);
        Ok(line)
    }

    /// Encode without the trailing delimiter
    pub(crate) fn encode_record(&self) -> Result<String> {
        let record = WireRecord {
            uuid: self.token,
            flag: self.flag(),
        };
        serde_json::to_string(&record).map_err(|e| Error::Internal(e.to_string()))
    }

    /// Decode one complete record. A trailing delimiter is tolerated.
    pub fn decode(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\n', '\r']);
        let record: WireRecord = serde_json::from_str(line)
            .map_err(|e| Error::MalformedMessage(format!("{}: {:?}", e, line)))?;

        let announcement = match record.flag {
            FLAG_ELECTION => false,
            FLAG_ANNOUNCEMENT => true,
            other => {
                return Err(Error::MalformedMessage(format!("unknown flag {}", other)));
            }
        };

        Ok(Self {
            token: record.uuid,
            announcement,
        })
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "uuid={}, flag={}", self.token, self.flag())
    }
}
