//! Shared value types: timestamps, callers and pagination
use super::error::ArchiveError;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    /// `None` when the fields do not name a valid UTC instant
    pub fn new_with(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        min: u32,
        sec: u32,
    ) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl Default for TimeStamp {
    fn default() -> Self {
        Self::new()
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
    Bot,
}

/// Who is calling. Passed explicitly into every audited operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Actor {
    #[default]
    Anonymous,
    Authenticated { username: String, roles: Vec<Role> },
}

impl Actor {
    pub fn authenticated(username: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Actor::Authenticated {
            username: username.into(),
            roles: roles.into_iter().collect(),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        match self {
            Actor::Anonymous => false,
            Actor::Authenticated { roles, .. } => roles.contains(&role),
        }
    }

    /// Name recorded in audit events. Missing identities fall back to `UNKNOWN`.
    pub fn display_name(&self) -> String {
        match self {
            Actor::Authenticated { username, .. } if !username.is_empty() => username.clone(),
            _ => "UNKNOWN".to_string(),
        }
    }
}

/// Offset pagination metadata attached to list responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub count: usize,
    pub limit: usize,
    pub offset: usize,
}

impl Pagination {
    /// Validates a 1-based page request against the maximum page size
    pub fn for_page(page: usize, size: usize, max_size: usize) -> Result<Self, ArchiveError> {
        if page == 0 {
            return Err(ArchiveError::Validation("page must be at least 1".into()));
        }
        if size == 0 || size > max_size {
            return Err(ArchiveError::Validation(format!(
                "size must be between 1 and {max_size}, got {size}"
            )));
        }
        let offset = (page - 1).checked_mul(size).ok_or_else(|| {
            ArchiveError::Validation(format!("page {page} is out of range for size {size}"))
        })?;
        Ok(Self {
            count: 0,
            limit: size,
            offset,
        })
    }

    pub fn total_pages(&self) -> usize {
        if self.limit == 0 {
            return 0;
        }
        self.count.div_ceil(self.limit)
    }

    pub fn headers(&self) -> [(&'static str, String); 4] {
        [
            ("X-Pagination-Count", self.count.to_string()),
            ("X-Pagination-Limit", self.limit.to_string()),
            ("X-Pagination-Offset", self.offset.to_string()),
            ("X-Pagination-TotalPages", self.total_pages().to_string()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}
