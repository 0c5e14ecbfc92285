use std::fmt;

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{config::DrillthroughConfig, data::Value};

/// Bind names for named-parameter invocation, in positional order.
pub const PARAMETER_NAMES: [&str; 7] = [
    ":year",
    ":month",
    ":store",
    ":state",
    ":channel",
    ":from_date",
    ":to_date",
];

/// The fixed filter tuple every source is invoked with. Unused filters stay
/// `None` and are passed as null.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub year: i32,
    pub month: Option<u32>,
    pub store: Option<String>,
    pub state: Option<String>,
    pub channel: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters::for_year(2024)
    }
}

impl Parameters {
    pub fn for_year(year: i32) -> Self {
        Parameters {
            year,
            month: None,
            store: None,
            state: None,
            channel: None,
            from_date: None,
            to_date: None,
        }
    }

    pub fn with_store(mut self, store: impl Into<String>) -> Self {
        self.store = Some(store.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(month) = self.month
            && !(1..=12).contains(&month)
        {
            return Err(anyhow!("Month must be between 1 and 12, got {month}"));
        }
        if let (Some(from), Some(to)) = (self.from_date, self.to_date)
            && from > to
        {
            return Err(anyhow!("From date {from} is after to date {to}"));
        }
        Ok(())
    }

    /// The tuple in positional order.
    pub fn to_values(&self) -> [Value; 7] {
        [
            Value::Integer(i64::from(self.year)),
            self.month.map(|m| Value::Integer(i64::from(m))).into(),
            self.store.clone().into(),
            self.state.clone().into(),
            self.channel.clone().into(),
            self.from_date.map(Value::Date).unwrap_or(Value::Null),
            self.to_date.map(Value::Date).unwrap_or(Value::Null),
        ]
    }

    /// Parameters for a drill-through view scoped to `selection`.
    ///
    /// Explicit overrides win, then the store name table, then an all-digit
    /// selection is taken as a store id. Anything else keeps `self`.
    pub fn for_drillthrough(&self, selection: &str, drill: &DrillthroughConfig) -> Parameters {
        let selection = selection.trim();
        if let Some(params) = drill.overrides.get(selection) {
            debug!("Drill-through '{selection}' uses configured parameters");
            return params.clone();
        }
        if let Some(store_id) = drill.store_ids.get(selection) {
            return self.clone().with_store(store_id.clone());
        }
        if !selection.is_empty() && selection.chars().all(|c| c.is_ascii_digit()) {
            return self.clone().with_store(selection);
        }
        self.clone()
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .to_values()
            .iter()
            .map(|v| match v {
                Value::Null => "NULL".to_string(),
                other => other.as_display(),
            })
            .collect::<Vec<_>>();
        write!(f, "({})", rendered.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drill() -> DrillthroughConfig {
        let mut config = DrillthroughConfig::default();
        config
            .store_ids
            .insert("Love Library".to_string(), "717".to_string());
        config
            .overrides
            .insert("E-Books".to_string(), Parameters::for_year(2023));
        config
    }

    #[test]
    fn display_renders_nulls() {
        let params = Parameters::for_year(2024).with_store("717");
        assert_eq!(params.to_string(), "(2024, NULL, 717, NULL, NULL, NULL, NULL)");
    }

    #[test]
    fn drillthrough_resolution_order() {
        let base = Parameters::for_year(2024);
        let drill = drill();
        assert_eq!(
            base.for_drillthrough("Love Library", &drill).store.as_deref(),
            Some("717")
        );
        assert_eq!(
            base.for_drillthrough("512", &drill).store.as_deref(),
            Some("512")
        );
        assert_eq!(base.for_drillthrough("E-Books", &drill).year, 2023);
        assert_eq!(base.for_drillthrough("MATLAB", &drill), base);
    }

    #[test]
    fn validation_rejects_bad_month_and_range() {
        let mut params = Parameters::for_year(2024);
        params.month = Some(13);
        assert!(params.validate().is_err());
        params.month = Some(2);
        params.from_date = NaiveDate::from_ymd_opt(2024, 3, 1);
        params.to_date = NaiveDate::from_ymd_opt(2024, 2, 1);
        assert!(params.validate().is_err());
    }
}
