//! Scan filters and their Gmail query form.
//!
//! Every field of [`FilterConfig`] is optional; the fields that are set are
//! combined with logical AND into one Gmail search expression.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};

use crate::validation::ValidationError;

/// Gmail inbox category tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Primary tab.
    Primary,
    /// Social networks.
    Social,
    /// Deals and marketing.
    Promotions,
    /// Receipts, statements and notifications.
    Updates,
    /// Mailing lists and groups.
    Forums,
}

impl Category {
    /// Name used in `category:` queries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Social => "social",
            Self::Promotions => "promotions",
            Self::Updates => "updates",
            Self::Forums => "forums",
        }
    }
}

/// Optional constraints narrowing a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Only messages received on or after this day.
    pub date_from: Option<NaiveDate>,
    /// Only messages received on or before this day.
    pub date_to: Option<NaiveDate>,
    /// Only messages larger than this many bytes.
    pub size_min: Option<u64>,
    /// Only messages in this category tab.
    pub category: Option<Category>,
    /// Sender address or domain.
    #[serde(deserialize_with = "blank_as_none")]
    pub sender: Option<String>,
    /// Label name.
    #[serde(deserialize_with = "blank_as_none")]
    pub label: Option<String>,
}

impl FilterConfig {
    /// Checks the filter before it reaches the network.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to)
            && from > to
        {
            return Err(ValidationError::DateRangeInverted);
        }
        if self.size_min == Some(0) {
            return Err(ValidationError::SizeMinZero);
        }
        if let Some(sender) = &self.sender
            && !is_query_safe(sender, false)
        {
            return Err(ValidationError::InvalidSender);
        }
        if let Some(label) = &self.label
            && !is_query_safe(label, true)
        {
            return Err(ValidationError::InvalidLabel);
        }
        Ok(())
    }

    /// Returns `true` when no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Gmail query for this filter, prefixed by `base` terms.
    ///
    /// `date_to` is inclusive, so `before:` names the following day.
    #[must_use]
    pub fn to_query(&self, base: &[&str]) -> String {
        let mut terms: Vec<String> = base.iter().map(ToString::to_string).collect();
        if let Some(from) = self.date_from {
            terms.push(format!("after:{}", from.format("%Y/%m/%d")));
        }
        if let Some(to) = self.date_to {
            let before = to.checked_add_days(Days::new(1)).unwrap_or(to);
            terms.push(format!("before:{}", before.format("%Y/%m/%d")));
        }
        if let Some(size) = self.size_min {
            terms.push(format!("larger:{size}"));
        }
        if let Some(category) = self.category {
            terms.push(format!("category:{}", category.as_str()));
        }
        if let Some(sender) = &self.sender {
            terms.push(format!("from:{}", sender.trim()));
        }
        if let Some(label) = &self.label {
            terms.push(format!("label:{}", label_query_name(label)));
        }
        terms.join(" ")
    }
}

/// Gmail's query form of a label name.
#[must_use]
pub fn label_query_name(name: &str) -> String {
    name.trim().replace(' ', "-")
}

/// Rejects values that could change the structure of a query.
pub(crate) fn is_query_safe(value: &str, allow_spaces: bool) -> bool {
    let value = value.trim();
    !value.is_empty()
        && !value.chars().any(|c| {
            matches!(c, '"' | '\'' | '(' | ')' | '{' | '}') || (!allow_spaces && c.is_whitespace())
        })
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}
