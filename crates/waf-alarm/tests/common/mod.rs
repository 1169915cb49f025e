// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod mocks;

use chrono::{DateTime, Utc};

/// 2022-03-01T00:00:00Z
pub const BASE_MILLIS: i64 = 1_646_092_800_000;
pub const MINUTE_MILLIS: i64 = 60_000;

pub fn waf_line(client_ip: &str, millis: i64) -> String {
    format!(
        r#"{{"timestamp":{millis},"formatVersion":1,"action":"BLOCK","httpRequest":{{"clientIp":"{client_ip}","country":"US","headers":[{{"name":"Host","value":"shop.example.com"}}],"uri":"/login","args":"user=admin","httpVersion":"HTTP/1.1","httpMethod":"POST","requestId":"req-{millis}"}}}}"#
    )
}

#[allow(clippy::unwrap_used)]
pub fn at_minute(minute: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(BASE_MILLIS + minute * MINUTE_MILLIS).unwrap()
}
