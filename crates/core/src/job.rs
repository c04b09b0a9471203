//! Hire platform job record.
//!
//! Decoded once from the job endpoint's JSON through an alias table, with
//! hire dates converted from the platform's local wall time to UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use hirebill_shared::FieldAliases;
use hirebill_shared::types::JobId;

use crate::timing::{HireWindow, TimingError};

const JOB_ID: FieldAliases =
    FieldAliases::new("job_id", &["job_id", "JOB_ID", "job", "ID", "id", "number"]);
const CUSTOMER_NAME: FieldAliases = FieldAliases::new(
    "customer_name",
    &["customer_name", "CUSTOMER_NAME", "client", "NAME", "name", "company"],
);
const CUSTOMER_EMAIL: FieldAliases = FieldAliases::new(
    "customer_email",
    &["customer_email", "email", "EMAIL", "CLIENT_EMAIL", "client_email"],
);
const HIRE_START: FieldAliases = FieldAliases::new(
    "hire_start",
    &["job_start", "JOB_START", "out_date", "OUT_DATE", "start", "start_date", "JOB_DATE"],
);
const HIRE_END: FieldAliases = FieldAliases::new(
    "hire_end",
    &["job_end", "JOB_END", "return_date", "RETURN_DATE", "end", "end_date"],
);
const STATUS: FieldAliases = FieldAliases::new("status", &["status", "STATUS", "job_status"]);
const ITEMS: FieldAliases =
    FieldAliases::new("items", &["items", "ITEMS", "line_items", "supplying"]);
const ITEM_CATEGORY: FieldAliases = FieldAliases::new(
    "category",
    &["category", "CATEGORY", "category_name", "CATEGORY_NAME", "title", "name", "NAME"],
);
const ITEM_QUANTITY: FieldAliases =
    FieldAliases::new("quantity", &["qty", "quantity", "QTY", "QUANTITY"]);

/// Job decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// A required field is missing.
    #[error("Job record is missing {0}")]
    MissingField(&'static str),

    /// A date field could not be parsed.
    #[error("Job field {field} has unparseable date {value:?}")]
    InvalidDate {
        /// Logical field name.
        field: &'static str,
        /// Raw value.
        value: String,
    },
}

/// One line item on a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Category or item name.
    pub category: String,
    /// Quantity supplied.
    pub quantity: u32,
    /// True if the category names an excess-bearing vehicle.
    pub is_vehicle: bool,
}

/// A job as seen by the billing logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job number.
    pub id: JobId,
    /// Customer or company name.
    pub customer_name: Option<String>,
    /// Customer email.
    pub customer_email: Option<String>,
    /// Hire start (UTC).
    pub hire_start: Option<DateTime<Utc>>,
    /// Hire end (UTC).
    pub hire_end: Option<DateTime<Utc>>,
    /// Hire platform status code.
    pub status: i64,
    /// Line items.
    pub items: Vec<LineItem>,
}

impl JobRecord {
    /// Number of excess-bearing vehicles on hire.
    #[must_use]
    pub fn vehicle_count(&self) -> u32 {
        self.items
            .iter()
            .filter(|item| item.is_vehicle)
            .fold(0, |count: u32, item| count.saturating_add(item.quantity))
    }

    /// Hire window, if both dates are present.
    ///
    /// # Errors
    ///
    /// Returns `TimingError::InvalidWindow` if the end precedes the start.
    pub fn hire_window(&self) -> Result<Option<HireWindow>, TimingError> {
        match (self.hire_start, self.hire_end) {
            (Some(start), Some(end)) => HireWindow::new(start, end).map(Some),
            _ => Ok(None),
        }
    }
}

/// Decodes job JSON with the platform's timezone and vehicle keywords.
#[derive(Debug, Clone)]
pub struct JobDecoder {
    timezone: Tz,
    vehicle_keywords: Vec<String>,
}

impl Default for JobDecoder {
    fn default() -> Self {
        Self::new(
            chrono_tz::Europe::London,
            ["vehicle", "van", "car", "minibus", "truck"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        )
    }
}

impl JobDecoder {
    /// Creates a decoder.
    #[must_use]
    pub fn new(timezone: Tz, vehicle_keywords: Vec<String>) -> Self {
        let vehicle_keywords = vehicle_keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            timezone,
            vehicle_keywords,
        }
    }

    /// Timezone of the platform's wall-clock dates.
    #[must_use]
    pub const fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Decodes a job payload.
    ///
    /// # Errors
    ///
    /// Returns `JobError` if the job number is missing or a date is
    /// unparseable.
    pub fn decode(&self, raw: &Value) -> Result<JobRecord, JobError> {
        let id = JOB_ID
            .string(raw)
            .map(JobId::new)
            .ok_or(JobError::MissingField("job_id"))?;

        let items = match ITEMS.resolve(raw) {
            Some(Value::Array(items)) => items.iter().filter_map(|i| self.line_item(i)).collect(),
            Some(Value::Object(map)) => map.values().filter_map(|i| self.line_item(i)).collect(),
            _ => Vec::new(),
        };

        Ok(JobRecord {
            id,
            customer_name: CUSTOMER_NAME.string(raw),
            customer_email: CUSTOMER_EMAIL.string(raw),
            hire_start: self.date(raw, &HIRE_START)?,
            hire_end: self.date(raw, &HIRE_END)?,
            status: STATUS.integer(raw).unwrap_or_default(),
            items,
        })
    }

    fn line_item(&self, raw: &Value) -> Option<LineItem> {
        let category = ITEM_CATEGORY.string(raw)?;
        let quantity = ITEM_QUANTITY
            .integer(raw)
            .and_then(|q| u32::try_from(q).ok())
            .unwrap_or(1);
        Some(LineItem {
            is_vehicle: self.is_vehicle_category(&category),
            category,
            quantity,
        })
    }

    /// Returns true if a category name contains a vehicle keyword as a
    /// whole word (plural forms included).
    #[must_use]
    pub fn is_vehicle_category(&self, category: &str) -> bool {
        let lower = category.to_lowercase();
        lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .any(|word| {
                let singular = word
                    .strip_suffix("es")
                    .filter(|s| self.vehicle_keywords.iter().any(|k| k == s))
                    .or_else(|| word.strip_suffix('s'))
                    .unwrap_or(word);
                self.vehicle_keywords
                    .iter()
                    .any(|k| k == word || k == singular)
            })
    }

    fn date(
        &self,
        raw: &Value,
        aliases: &FieldAliases,
    ) -> Result<Option<DateTime<Utc>>, JobError> {
        let Some(text) = aliases.string(raw) else {
            return Ok(None);
        };
        if text.starts_with("0000-00-00") {
            return Ok(None);
        }
        self.parse_local(&text)
            .map(Some)
            .ok_or(JobError::InvalidDate {
                field: aliases.field,
                value: text,
            })
    }

    fn parse_local(&self, text: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.with_timezone(&Utc));
        }
        let naive = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })?;
        self.timezone
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}
