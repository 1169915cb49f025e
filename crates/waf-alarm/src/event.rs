// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoding of individual WAF log records.
//!
//! Each record is one line of the firewall's JSON log. Only the client ip and the timestamp
//! drive alarm decisions; the raw line is carried along verbatim as the alarm detail.

use crate::errors::DecodeError;
use chrono::{DateTime, FixedOffset, Offset, TimeDelta, Utc};
use serde::Deserialize;

/// `2022-03-01T08:00:00 +08:00:00`
const DISPLAY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S %::z";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WafLogRecord {
    pub http_request: HttpRequest,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpRequest {
    pub client_ip: String,
    pub args: String,
    pub country: String,
    pub headers: Vec<HttpHeader>,
    pub http_method: String,
    pub http_version: String,
    pub request_id: String,
    pub uri: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

/// One blocked request, ready for counting and persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub client_ip: String,
    pub timestamp: DateTime<Utc>,
    pub formatted_timestamp: String,
    /// The original log line, untouched.
    pub detail: String,
}

impl Event {
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    display_offset: FixedOffset,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            display_offset: Utc.fix(),
        }
    }
}

impl Decoder {
    pub fn new(display_offset: FixedOffset) -> Self {
        Self { display_offset }
    }

    pub fn decode(&self, raw: &str) -> Result<Event, DecodeError> {
        let record: WafLogRecord = serde_json::from_str(raw)?;
        if record.http_request.client_ip.trim().is_empty() {
            return Err(DecodeError::MissingClientIp);
        }

        let timestamp = DateTime::from_timestamp_millis(record.timestamp)
            .ok_or(DecodeError::Timestamp(record.timestamp))?;

        Ok(Event {
            client_ip: record.http_request.client_ip,
            formatted_timestamp: format_timestamp(timestamp, self.display_offset),
            timestamp,
            detail: raw.to_string(),
        })
    }
}

pub fn format_timestamp(timestamp: DateTime<Utc>, offset: FixedOffset) -> String {
    timestamp
        .with_timezone(&offset)
        .format(DISPLAY_FORMAT)
        .to_string()
}

/// Epoch seconds after which external retention may drop the record.
///
/// Fails when the expiry falls outside the representable time range.
pub fn expiry_marker(timestamp: DateTime<Utc>, retention: TimeDelta) -> Result<i64, DecodeError> {
    timestamp
        .checked_add_signed(retention)
        .map(|expiry| expiry.timestamp())
        .ok_or(DecodeError::Timestamp(timestamp.timestamp_millis()))
}
