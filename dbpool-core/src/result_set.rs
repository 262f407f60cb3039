//! The result set façade (§4.4).
//!
//! A forward-only, single-pass cursor. Column indices are 1-based at this layer and 0-based
//! at the [`crate::driver::ResultSetDriver`] layer; the translation and the `maxRows` cap are
//! this module's only independent logic, grounded in `original_source/src/db/ResultSet.c`'s
//! `ResultSet_next` (`current >= maxRows` forces `false` rather than calling the delegate).

use crate::driver::ResultSetDriver;
use crate::error::{Error, Result};
use crate::temporal::{SqlDate, SqlDateTime, SqlTime};

pub struct ResultSet {
    driver: Box<dyn ResultSetDriver>,
    max_rows: u32,
    rows_returned: u32,
    at_end: bool,
}

impl ResultSet {
    pub(crate) fn new(driver: Box<dyn ResultSetDriver>, max_rows: u32) -> Self {
        ResultSet { driver, max_rows, rows_returned: 0, at_end: false }
    }

    pub fn column_count(&self) -> usize {
        self.driver.column_count()
    }

    pub fn column_name(&self, index: usize) -> Result<&str> {
        let i = self.to_internal(index)?;
        Ok(self.driver.column_name(i))
    }

    pub fn column_size(&self, index: usize) -> Result<usize> {
        let i = self.to_internal(index)?;
        Ok(self.driver.column_size(i))
    }

    /// Advances the cursor; `false` at end. Once `max_rows` (0 = unlimited) rows have been
    /// returned, the cursor is forced to end without consulting the driver further.
    pub fn next(&mut self) -> bool {
        if self.at_end {
            return false;
        }
        if self.max_rows != 0 && self.rows_returned >= self.max_rows {
            self.at_end = true;
            return false;
        }
        if self.driver.next() {
            self.rows_returned += 1;
            true
        } else {
            self.at_end = true;
            false
        }
    }

    pub fn isnull(&self, index: usize) -> Result<bool> {
        let i = self.to_internal(index)?;
        Ok(self.driver.isnull(i))
    }

    fn to_internal(&self, index: usize) -> Result<usize> {
        let len = self.driver.column_count();
        if index == 0 || index > len {
            return Err(Error::ColumnIndexOutOfBounds { index, len });
        }
        Ok(index - 1)
    }

    /// Case-sensitive scan of columns `1..=n`, per §4.4.
    fn index_by_name(&self, name: &str) -> Result<usize> {
        let len = self.driver.column_count();
        for i in 0..len {
            if self.driver.column_name(i) == name {
                return Ok(i + 1);
            }
        }
        Err(Error::ColumnNotFound(name.to_owned()))
    }

    pub fn get_string(&self, index: usize) -> Result<Option<&str>> {
        let i = self.to_internal(index)?;
        Ok(self.driver.get_string(i))
    }

    pub fn get_string_by_name(&self, name: &str) -> Result<Option<&str>> {
        let index = self.index_by_name(name)?;
        self.get_string(index)
    }

    pub fn get_blob(&self, index: usize) -> Result<Option<&[u8]>> {
        let i = self.to_internal(index)?;
        Ok(self.driver.get_blob(i))
    }

    pub fn get_blob_by_name(&self, name: &str) -> Result<Option<&[u8]>> {
        let index = self.index_by_name(name)?;
        self.get_blob(index)
    }

    fn parse_numeric<T, F>(&self, index: usize, parse: F) -> Result<Option<T>>
    where
        F: FnOnce(&str) -> std::result::Result<T, ()>,
    {
        match self.get_string(index)? {
            None => Ok(None),
            Some(s) => parse(s)
                .map(Some)
                .map_err(|_| Error::ValueParse(format!("could not parse '{s}' as the requested numeric type"))),
        }
    }

    pub fn get_int(&self, index: usize) -> Result<Option<i32>> {
        self.parse_numeric(index, |s| s.trim().parse::<i32>().map_err(|_| ()))
    }

    pub fn get_int_by_name(&self, name: &str) -> Result<Option<i32>> {
        self.get_int(self.index_by_name(name)?)
    }

    pub fn get_llong(&self, index: usize) -> Result<Option<i64>> {
        self.parse_numeric(index, |s| s.trim().parse::<i64>().map_err(|_| ()))
    }

    pub fn get_llong_by_name(&self, name: &str) -> Result<Option<i64>> {
        self.get_llong(self.index_by_name(name)?)
    }

    pub fn get_double(&self, index: usize) -> Result<Option<f64>> {
        self.parse_numeric(index, |s| s.trim().parse::<f64>().map_err(|_| ()))
    }

    pub fn get_double_by_name(&self, name: &str) -> Result<Option<f64>> {
        self.get_double(self.index_by_name(name)?)
    }

    pub fn get_timestamp(&self, index: usize) -> Result<Option<i64>> {
        match self.get_string(index)? {
            None => Ok(None),
            Some(s) => {
                if let Ok(direct) = s.trim().parse::<i64>() {
                    return Ok(Some(direct));
                }
                crate::temporal::to_timestamp(s).map(Some)
            }
        }
    }

    pub fn get_timestamp_by_name(&self, name: &str) -> Result<Option<i64>> {
        self.get_timestamp(self.index_by_name(name)?)
    }

    pub fn get_date(&self, index: usize) -> Result<Option<SqlDate>> {
        match self.get_string(index)? {
            None => Ok(None),
            Some(s) => crate::temporal::parse_date(s).map(Some),
        }
    }

    pub fn get_date_by_name(&self, name: &str) -> Result<Option<SqlDate>> {
        self.get_date(self.index_by_name(name)?)
    }

    pub fn get_time(&self, index: usize) -> Result<Option<SqlTime>> {
        match self.get_string(index)? {
            None => Ok(None),
            Some(s) => crate::temporal::parse_time(s).map(Some),
        }
    }

    pub fn get_time_by_name(&self, name: &str) -> Result<Option<SqlTime>> {
        self.get_time(self.index_by_name(name)?)
    }

    pub fn get_datetime(&self, index: usize) -> Result<Option<SqlDateTime>> {
        match self.get_string(index)? {
            None => Ok(None),
            Some(s) => crate::temporal::parse_datetime(s).map(Some),
        }
    }

    pub fn get_datetime_by_name(&self, name: &str) -> Result<Option<SqlDateTime>> {
        self.get_datetime(self.index_by_name(name)?)
    }
}
