//! The prepared statement façade (§4.3).
//!
//! Grounded in `original_source/src/db/PreparedStatement.c`: a thin forwarding layer whose
//! only independent logic is the `[1, parameter_count]` range check shared by every setter
//! and the "dispose-before-execute" rule for the owned result set.

use crate::driver::PreparedStatementDriver;
use crate::error::{Error, Result};
use crate::result_set::ResultSet;

pub struct PreparedStatement {
    driver: Box<dyn PreparedStatementDriver>,
    current_result: Option<ResultSet>,
    max_rows: u32,
}

impl PreparedStatement {
    pub(crate) fn new(driver: Box<dyn PreparedStatementDriver>) -> Self {
        PreparedStatement { driver, current_result: None, max_rows: 0 }
    }

    pub fn parameter_count(&self) -> usize {
        self.driver.parameter_count()
    }

    pub fn set_max_rows(&mut self, n: u32) {
        self.max_rows = n;
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index == 0 || index > self.driver.parameter_count() {
            return Err(Error::ParameterIndexOutOfRange);
        }
        Ok(())
    }

    pub fn set_string(&mut self, index: usize, value: Option<&str>) -> Result<()> {
        self.check_index(index)?;
        self.driver.set_string(index, value)
    }

    pub fn set_int(&mut self, index: usize, value: i32) -> Result<()> {
        self.check_index(index)?;
        self.driver.set_int(index, value)
    }

    pub fn set_llong(&mut self, index: usize, value: i64) -> Result<()> {
        self.check_index(index)?;
        self.driver.set_llong(index, value)
    }

    pub fn set_double(&mut self, index: usize, value: f64) -> Result<()> {
        self.check_index(index)?;
        self.driver.set_double(index, value)
    }

    pub fn set_blob(&mut self, index: usize, value: Option<&[u8]>) -> Result<()> {
        self.check_index(index)?;
        self.driver.set_blob(index, value)
    }

    pub fn set_timestamp(&mut self, index: usize, epoch_seconds: i64) -> Result<()> {
        self.check_index(index)?;
        self.driver.set_timestamp(index, epoch_seconds)
    }

    /// Parses `value` with [`crate::temporal::to_timestamp`] and binds the resulting epoch
    /// seconds — a convenience built on [`PreparedStatement::set_timestamp`].
    pub fn set_datetime_str(&mut self, index: usize, value: &str) -> Result<()> {
        let epoch = crate::temporal::to_timestamp(value)?;
        self.set_timestamp(index, epoch)
    }

    pub fn execute(&mut self) -> Result<()> {
        self.current_result = None;
        self.driver.execute()
    }

    pub fn execute_query(&mut self) -> Result<&mut ResultSet> {
        self.current_result = None;
        let driver_result = self.driver.execute_query()?;
        self.current_result = Some(ResultSet::new(driver_result, self.max_rows));
        Ok(self.current_result.as_mut().expect("just assigned"))
    }

    pub fn rows_changed(&mut self) -> i64 {
        self.driver.rows_changed()
    }
}
