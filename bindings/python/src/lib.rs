//! Provides tools and interfaces to integrate the crate's functionality with Python.

mod guide;
mod index;
mod vocabulary;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::PyErr;

use ::regex_guide_core::Error as CoreError;

use crate::guide::PyGuide;
use crate::index::PyIndex;
use crate::vocabulary::PyVocabulary;

pub struct Error(CoreError);

impl From<CoreError> for Error {
    fn from(e: CoreError) -> Self {
        Error(e)
    }
}

impl From<Error> for PyErr {
    fn from(e: Error) -> Self {
        PyErr::new::<PyValueError, _>(e.to_string())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[pymodule]
fn regex_guide_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyIndex>()?;
    m.add_class::<PyVocabulary>()?;
    m.add_class::<PyGuide>()?;

    Ok(())
}
