use std::{convert::Infallible, fmt, str::FromStr};

use chrono::NaiveDateTime;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Primary key of a backend row. Tables use numeric ids, but the list contract
/// allows string keys too.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for RowId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RowId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RowId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl FromStr for RowId {
    type Err = Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        Ok(raw
            .parse::<i64>()
            .map(Self::Number)
            .unwrap_or_else(|_| Self::Text(raw.to_string())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Holdings,
    Messages,
    Reports,
    Metrics,
}

impl ResourceKind {
    pub const ALL: [Self; 4] = [Self::Holdings, Self::Messages, Self::Reports, Self::Metrics];

    /// Path under the API root, e.g. `crypto/holdings`.
    pub const fn path(self) -> &'static str {
        match self {
            Self::Holdings => "crypto/holdings",
            Self::Messages => "crypto/message",
            Self::Reports => "crypto/report",
            Self::Metrics => "crypto/metrics",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Holdings => "holdings",
            Self::Messages => "messages",
            Self::Reports => "reports",
            Self::Metrics => "metrics",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A row served by one of the backend list endpoints.
pub trait ResourceRow: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: ResourceKind;

    fn row_id(&self) -> &RowId;
}

/// Rows the backend lets clients insert. `Draft` is the row without its id.
pub trait CreatableRow: ResourceRow {
    type Draft: Serialize + Send + Sync;
}

/// Timestamps arrive as `yyyy-MM-dd HH:mm:ss`. RFC 3339 is accepted as well;
/// anything unparseable decodes to `None` rather than rejecting the row.
pub mod backend_time {
    use chrono::{DateTime, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        NaiveDateTime::parse_from_str(raw, FORMAT)
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|ts| ts.naive_utc()))
            .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").ok())
    }

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.collect_str(&ts.format(FORMAT)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    #[serde(other)]
    Unknown,
}

impl Sentiment {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "POSITIVE",
            Self::Negative => "NEGATIVE",
            Self::Neutral => "NEUTRAL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportStatus {
    #[serde(rename = "0")]
    Pending,
    #[serde(rename = "1")]
    Approved,
    #[serde(rename = "2")]
    Rejected,
    #[serde(other)]
    Unknown,
}

impl ReportStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub id: RowId,
    #[serde(default)]
    pub coin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usdt_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(rename = "change24h", default, skip_serializing_if = "Option::is_none")]
    pub change_24h: Option<f64>,
    #[serde(default, with = "backend_time", skip_serializing_if = "Option::is_none")]
    pub create_time: Option<NaiveDateTime>,
    #[serde(default, with = "backend_time", skip_serializing_if = "Option::is_none")]
    pub update_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingDraft {
    pub coin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usdt_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_price: Option<f64>,
}

impl ResourceRow for Holding {
    const KIND: ResourceKind = ResourceKind::Holdings;

    fn row_id(&self) -> &RowId {
        &self.id
    }
}

impl CreatableRow for Holding {
    type Draft = HoldingDraft;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoMessage {
    pub id: RowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    #[serde(default)]
    pub coin: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact_score: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, with = "backend_time", skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<NaiveDateTime>,
    #[serde(default, with = "backend_time", skip_serializing_if = "Option::is_none")]
    pub create_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoMessageDraft {
    pub coin: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact_score: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, with = "backend_time", skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<NaiveDateTime>,
}

impl ResourceRow for CryptoMessage {
    const KIND: ResourceKind = ResourceKind::Messages;

    fn row_id(&self) -> &RowId {
        &self.id
    }
}

impl CreatableRow for CryptoMessage {
    type Draft = CryptoMessageDraft;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentReport {
    pub id: RowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advice_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ReportStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_by: Option<String>,
    #[serde(default, with = "backend_time", skip_serializing_if = "Option::is_none")]
    pub audit_time: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_json: Option<String>,
    #[serde(default, with = "backend_time", skip_serializing_if = "Option::is_none")]
    pub create_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentReportDraft {
    pub message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advice_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ReportStatus>,
}

impl ResourceRow for InvestmentReport {
    const KIND: ResourceKind = ResourceKind::Reports;

    fn row_id(&self) -> &RowId {
        &self.id
    }
}

impl CreatableRow for InvestmentReport {
    type Draft = InvestmentReportDraft;
}

/// Market snapshot per coin. The backend exposes these read-only apart from
/// the collect job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoMetrics {
    pub id: RowId,
    #[serde(default)]
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_rate: Option<f64>,
    #[serde(rename = "change24h", default, skip_serializing_if = "Option::is_none")]
    pub change_24h: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_count: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_fees_btc: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_count: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ath_price: Option<f64>,
    #[serde(default, with = "backend_time", skip_serializing_if = "Option::is_none")]
    pub snapshot_time: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_by: Option<String>,
    #[serde(default, with = "backend_time", skip_serializing_if = "Option::is_none")]
    pub update_time: Option<NaiveDateTime>,
}

impl ResourceRow for CryptoMetrics {
    const KIND: ResourceKind = ResourceKind::Metrics;

    fn row_id(&self) -> &RowId {
        &self.id
    }
}
