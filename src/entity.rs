//! Entity types - the rows of the live tables
//!
//! Every entity is owned by a user; the `user_id` partition key is never
//! part of the struct and is always supplied by the caller of the
//! repository. `id` is 0 until the row has been inserted.

use crate::money::Money;
use crate::table::LiveTable;
use crate::{Error, Result};
use chrono::{Datelike, Local, NaiveDate};
use rusqlite::Row;
use rusqlite::types::{Value, ValueRef};
use serde::{Deserialize, Serialize};

/// Accounting period a row belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        let period = Self { year, month };
        period.validate()?;
        Ok(period)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self { year: date.year(), month: date.month() }
    }

    /// The period of today's local date
    pub fn current() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    fn validate(&self) -> Result<()> {
        if !(1..=12).contains(&self.month) {
            return Err(Error::validation(format!("Month must be 1-12, got {}", self.month)));
        }
        Ok(())
    }
}

/// Optional year/month filter for listings.
///
/// Only a filter with both parts set restricts anything; a filter with
/// just one of them behaves like no filter at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodFilter {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

impl PeriodFilter {
    /// No filtering
    pub fn all() -> Self {
        Self::default()
    }

    pub fn of(period: Period) -> Self {
        Self { year: Some(period.year), month: Some(period.month) }
    }

    /// The period actually applied, if any
    pub fn effective(&self) -> Option<Period> {
        match (self.year, self.month) {
            (Some(year), Some(month)) => Some(Period { year, month }),
            _ => None,
        }
    }
}

/// A row type of one of the live tables.
pub trait Record: Sized {
    const TABLE: LiveTable;

    fn id(&self) -> i64;

    /// Value of the table's parent key, if it has one
    fn parent_id(&self) -> Option<i64> {
        None
    }

    /// Values for `TABLE.data_columns()`, in the same order
    fn column_values(&self) -> Vec<Value>;

    /// Build from a row selected as `id, <data_columns...>`
    fn from_row(row: &Row) -> rusqlite::Result<Self>;

    /// Business rules checked before any write
    fn validate(&self) -> Result<()>;

    /// Name used for photo files and messages
    fn display_label(&self) -> String;
}

fn text(row: &Row, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

fn optional_text(row: &Row, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(row.get::<_, Option<String>>(idx)?.filter(|s| !s.is_empty()))
}

/// Numeric value of a column that may hold text, integer or real.
fn number(row: &Row, idx: usize) -> rusqlite::Result<f64> {
    match row.get_ref(idx)? {
        ValueRef::Null => Ok(0.0),
        ValueRef::Integer(i) => Ok(i as f64),
        ValueRef::Real(r) => Ok(r),
        ValueRef::Text(bytes) => {
            let s = String::from_utf8_lossy(bytes);
            let s = s.trim();
            if s.is_empty() {
                return Ok(0.0);
            }
            s.replace(',', ".").parse::<f64>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
            })
        }
        ValueRef::Blob(_) => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "quantity".to_string(),
            rusqlite::types::Type::Blob,
        )),
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn txt(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn money(m: Money) -> Value {
    Value::Text(m.to_string())
}

fn opt_txt(s: &Option<String>) -> Value {
    s.as_ref().map(|s| Value::Text(s.clone())).unwrap_or(Value::Null)
}

/// A customer (konsumen).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Consumer {
    pub id: i64,
    /// Entry date as shown to the user (`dd/MM/yyyy`)
    pub date: String,
    pub name: String,
    pub address: String,
    /// Sales agent name, free text
    pub sales: String,
    pub job: String,
    pub total_projects: Money,
    /// Worker name, free text
    pub worker: String,
    pub notes: String,
    pub period: Period,
}

impl Consumer {
    pub fn new(name: impl Into<String>, total_projects: Money, period: Period) -> Self {
        Self {
            name: name.into(),
            total_projects,
            period,
            ..Default::default()
        }
    }
}

impl Record for Consumer {
    const TABLE: LiveTable = LiveTable::Consumers;

    fn id(&self) -> i64 {
        self.id
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            txt(&self.date),
            txt(&self.name),
            txt(&self.address),
            txt(&self.sales),
            txt(&self.job),
            money(self.total_projects),
            txt(&self.worker),
            txt(&self.notes),
            Value::Integer(self.period.year.into()),
            Value::Integer(self.period.month.into()),
        ]
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            date: text(row, 1)?,
            name: text(row, 2)?,
            address: text(row, 3)?,
            sales: text(row, 4)?,
            job: text(row, 5)?,
            total_projects: row.get(6)?,
            worker: text(row, 7)?,
            notes: text(row, 8)?,
            period: Period { year: row.get(9)?, month: row.get(10)? },
        })
    }

    fn validate(&self) -> Result<()> {
        require("Consumer name", &self.name)?;
        self.period.validate()
    }

    fn display_label(&self) -> String {
        self.name.clone()
    }
}

/// A sales agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesAgent {
    pub id: i64,
    pub name: String,
}

impl SalesAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { id: 0, name: name.into() }
    }
}

impl Record for SalesAgent {
    const TABLE: LiveTable = LiveTable::Sales;

    fn id(&self) -> i64 {
        self.id
    }

    fn column_values(&self) -> Vec<Value> {
        vec![txt(&self.name)]
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self { id: row.get(0)?, name: text(row, 1)? })
    }

    fn validate(&self) -> Result<()> {
        require("Sales name", &self.name)
    }

    fn display_label(&self) -> String {
        self.name.clone()
    }
}

/// A project brought in by a sales agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesProject {
    pub id: i64,
    pub sales_id: i64,
    pub customer_name: String,
    pub address: String,
    pub job: String,
    pub total_project: Money,
    pub commission: Money,
    /// Deduction ("KB") subtracted from the commission
    pub kb: Money,
    pub notes: String,
    pub period: Period,
    /// Storage-relative photo path
    pub photo_path: Option<String>,
}

impl SalesProject {
    pub fn new(sales_id: i64, customer_name: impl Into<String>, period: Period) -> Self {
        Self {
            sales_id,
            customer_name: customer_name.into(),
            period,
            ..Default::default()
        }
    }
}

impl Record for SalesProject {
    const TABLE: LiveTable = LiveTable::SalesProjects;

    fn id(&self) -> i64 {
        self.id
    }

    fn parent_id(&self) -> Option<i64> {
        Some(self.sales_id)
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.sales_id),
            txt(&self.customer_name),
            txt(&self.address),
            txt(&self.job),
            money(self.total_project),
            money(self.commission),
            money(self.kb),
            txt(&self.notes),
            Value::Integer(self.period.year.into()),
            Value::Integer(self.period.month.into()),
            opt_txt(&self.photo_path),
        ]
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sales_id: row.get(1)?,
            customer_name: text(row, 2)?,
            address: text(row, 3)?,
            job: text(row, 4)?,
            total_project: row.get(5)?,
            commission: row.get(6)?,
            kb: row.get(7)?,
            notes: text(row, 8)?,
            period: Period { year: row.get(9)?, month: row.get(10)? },
            photo_path: optional_text(row, 11)?,
        })
    }

    fn validate(&self) -> Result<()> {
        require("Customer name", &self.customer_name)?;
        self.period.validate()
    }

    fn display_label(&self) -> String {
        self.customer_name.clone()
    }
}

/// A worker (tukang).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: i64,
    pub name: String,
}

impl Worker {
    pub fn new(name: impl Into<String>) -> Self {
        Self { id: 0, name: name.into() }
    }
}

impl Record for Worker {
    const TABLE: LiveTable = LiveTable::Tukang;

    fn id(&self) -> i64 {
        self.id
    }

    fn column_values(&self) -> Vec<Value> {
        vec![txt(&self.name)]
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self { id: row.get(0)?, name: text(row, 1)? })
    }

    fn validate(&self) -> Result<()> {
        require("Worker name", &self.name)
    }

    fn display_label(&self) -> String {
        self.name.clone()
    }
}

/// A project carried out by a worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerProject {
    pub id: i64,
    pub tukang_id: i64,
    pub customer_name: String,
    pub address: String,
    pub job: String,
    pub size: String,
    pub kb: Money,
    pub notes: String,
    pub period: Period,
    pub photo_path: Option<String>,
}

impl WorkerProject {
    pub fn new(tukang_id: i64, customer_name: impl Into<String>, period: Period) -> Self {
        Self {
            tukang_id,
            customer_name: customer_name.into(),
            period,
            ..Default::default()
        }
    }
}

impl Record for WorkerProject {
    const TABLE: LiveTable = LiveTable::WorkerProjects;

    fn id(&self) -> i64 {
        self.id
    }

    fn parent_id(&self) -> Option<i64> {
        Some(self.tukang_id)
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.tukang_id),
            txt(&self.customer_name),
            txt(&self.address),
            txt(&self.job),
            txt(&self.size),
            money(self.kb),
            txt(&self.notes),
            Value::Integer(self.period.year.into()),
            Value::Integer(self.period.month.into()),
            opt_txt(&self.photo_path),
        ]
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tukang_id: row.get(1)?,
            customer_name: text(row, 2)?,
            address: text(row, 3)?,
            job: text(row, 4)?,
            size: text(row, 5)?,
            kb: row.get(6)?,
            notes: text(row, 7)?,
            period: Period { year: row.get(8)?, month: row.get(9)? },
            photo_path: optional_text(row, 10)?,
        })
    }

    fn validate(&self) -> Result<()> {
        require("Customer name", &self.customer_name)?;
        self.period.validate()
    }

    fn display_label(&self) -> String {
        self.customer_name.clone()
    }
}

/// A construction project with its material usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    /// Unique per user, case-insensitively
    pub name: String,
    pub sales_name: String,
    pub worker_name: String,
    pub start_date: String,
    pub end_date: String,
    pub total_project: Money,
    /// Down payment
    pub dp: Money,
}

impl Project {
    pub fn new(name: impl Into<String>, total_project: Money, dp: Money) -> Self {
        Self {
            name: name.into(),
            total_project,
            dp,
            ..Default::default()
        }
    }
}

impl Record for Project {
    const TABLE: LiveTable = LiveTable::Projects;

    fn id(&self) -> i64 {
        self.id
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            txt(&self.name),
            txt(&self.sales_name),
            txt(&self.worker_name),
            txt(&self.start_date),
            txt(&self.end_date),
            money(self.total_project),
            money(self.dp),
        ]
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: text(row, 1)?,
            sales_name: text(row, 2)?,
            worker_name: text(row, 3)?,
            start_date: text(row, 4)?,
            end_date: text(row, 5)?,
            total_project: row.get(6)?,
            dp: row.get(7)?,
        })
    }

    fn validate(&self) -> Result<()> {
        require("Project name", &self.name)
    }

    fn display_label(&self) -> String {
        self.name.clone()
    }
}

/// Material used on a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialUsage {
    pub id: i64,
    pub project_id: i64,
    pub date: String,
    pub item_name: String,
    pub quantity: f64,
    pub unit_price: Money,
    /// Always `quantity × unit_price`; recomputed on every write
    pub total: Money,
    pub notes: String,
}

impl MaterialUsage {
    pub fn new(project_id: i64, item_name: impl Into<String>, quantity: f64, unit_price: Money) -> Self {
        Self {
            id: 0,
            project_id,
            date: String::new(),
            item_name: item_name.into(),
            quantity,
            unit_price,
            total: unit_price.times(quantity),
            notes: String::new(),
        }
    }

    pub fn computed_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

impl Record for MaterialUsage {
    const TABLE: LiveTable = LiveTable::MaterialsUsage;

    fn id(&self) -> i64 {
        self.id
    }

    fn parent_id(&self) -> Option<i64> {
        Some(self.project_id)
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.project_id),
            txt(&self.date),
            txt(&self.item_name),
            Value::Text(self.quantity.to_string()),
            money(self.unit_price),
            money(self.computed_total()),
            txt(&self.notes),
        ]
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            date: text(row, 2)?,
            item_name: text(row, 3)?,
            quantity: number(row, 4)?,
            unit_price: row.get(5)?,
            total: row.get(6)?,
            notes: text(row, 7)?,
        })
    }

    fn validate(&self) -> Result<()> {
        require("Item name", &self.item_name)?;
        if !self.quantity.is_finite() || self.quantity < 0.0 {
            return Err(Error::validation(format!("Invalid quantity: {}", self.quantity)));
        }
        Ok(())
    }

    fn display_label(&self) -> String {
        self.item_name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_filter_needs_both_parts() {
        assert_eq!(PeriodFilter::all().effective(), None);
        assert_eq!(PeriodFilter { year: Some(2024), month: None }.effective(), None);
        assert_eq!(PeriodFilter { year: None, month: Some(3) }.effective(), None);
        assert_eq!(
            PeriodFilter { year: Some(2024), month: Some(3) }.effective(),
            Some(Period { year: 2024, month: 3 })
        );
    }

    #[test]
    fn test_period_rejects_bad_month() {
        assert!(Period::new(2024, 0).is_err());
        assert!(Period::new(2024, 13).is_err());
        assert!(Period::new(2024, 12).is_ok());
    }

    #[test]
    fn test_column_values_match_descriptor() {
        let period = Period::new(2024, 3).unwrap();
        assert_eq!(Consumer::new("a", Money::ZERO, period).column_values().len(), LiveTable::Consumers.data_columns().len());
        assert_eq!(SalesProject::new(1, "a", period).column_values().len(), LiveTable::SalesProjects.data_columns().len());
        assert_eq!(WorkerProject::new(1, "a", period).column_values().len(), LiveTable::WorkerProjects.data_columns().len());
        assert_eq!(Project::new("a", Money::ZERO, Money::ZERO).column_values().len(), LiveTable::Projects.data_columns().len());
        assert_eq!(
            MaterialUsage::new(1, "a", 1.0, Money::ZERO).column_values().len(),
            LiveTable::MaterialsUsage.data_columns().len()
        );
        assert_eq!(SalesAgent::new("a").column_values().len(), LiveTable::Sales.data_columns().len());
        assert_eq!(Worker::new("a").column_values().len(), LiveTable::Tukang.data_columns().len());
    }

    #[test]
    fn test_material_total_is_computed() {
        let mut usage = MaterialUsage::new(1, "Semen", 4.0, Money::new(65_000));
        assert_eq!(usage.total, Money::new(260_000));
        usage.total = Money::new(1);
        assert_eq!(usage.column_values()[5], Value::Text("Rp 260.000".to_string()));
    }

    #[test]
    fn test_required_names() {
        assert!(SalesAgent::new("  ").validate().is_err());
        assert!(Worker::new("Pak Budi").validate().is_ok());
        assert!(Consumer::new("", Money::ZERO, Period { year: 2024, month: 1 }).validate().is_err());
    }
}
