//! Provides Guide python interface.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use regex_guide_core::guide::Guide;
use regex_guide_core::prelude::*;

use crate::index::PyIndex;
use crate::Error;

#[pyclass(name = "Guide", module = "regex_guide_core")]
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct PyGuide(pub Guide);

#[pymethods]
impl PyGuide {
    #[new]
    #[pyo3(signature = (index, max_rollback=0))]
    fn __new__(index: PyIndex, max_rollback: usize) -> Self {
        PyGuide(Guide::new(index.0, max_rollback))
    }

    fn get_state(&self) -> StateId {
        self.0.get_state()
    }

    fn get_tokens(&self) -> Vec<TokenId> {
        self.0.get_tokens()
    }

    fn advance(&mut self, token_id: TokenId) -> PyResult<Vec<TokenId>> {
        self.0
            .advance(token_id)
            .map_err(|e| <Error as Into<PyErr>>::into(Error::from(e)))
    }

    fn rollback_state(&mut self, n: usize) -> PyResult<()> {
        self.0
            .rollback_state(n)
            .map_err(|e| <Error as Into<PyErr>>::into(Error::from(e)))
    }

    fn accepts_tokens(&self, token_ids: Vec<TokenId>) -> bool {
        self.0.accepts_tokens(&token_ids)
    }

    fn is_finished(&self) -> bool {
        self.0.is_finished()
    }

    /// Writes the currently allowed tokens as a little-endian, 32-bit-word-packed
    /// bitmask into the buffer at `ptr`. `ptr` is expected to be the raw address of a
    /// `n_elements`-long buffer of `element_size`-byte words (as returned by e.g.
    /// a tensor's `data_ptr()`).
    fn write_mask_into(&self, ptr: usize, n_elements: usize, element_size: usize) -> PyResult<()> {
        // Safety: callers are responsible for `ptr` addressing a writable buffer of at
        // least `n_elements * element_size` bytes; validated sizes/alignment are checked
        // by `Guide::write_mask_into` before any write happens.
        unsafe {
            self.0
                .write_mask_into(ptr as *mut u32, n_elements, element_size)
                .map_err(|e| <Error as Into<PyErr>>::into(Error::from(e)))
        }
    }

    fn __repr__(&self) -> String {
        format!("{:#?}", self.0)
    }

    fn __str__(&self) -> String {
        format!("{}", self.0)
    }

    fn __eq__(&self, other: &PyGuide) -> bool {
        self.0 == other.0
    }

    fn __reduce__(&self) -> PyResult<(PyObject, (Vec<u8>,))> {
        Python::with_gil(|py| {
            let cls = PyModule::import_bound(py, "regex_guide_core")?.getattr("Guide")?;
            let binary_data: Vec<u8> = bincode::encode_to_vec(self, bincode::config::standard())
                .map_err(|e| {
                    PyErr::new::<PyValueError, _>(format!("Serialization of Guide failed: {}", e))
                })?;
            Ok((cls.getattr("from_binary")?.to_object(py), (binary_data,)))
        })
    }

    #[staticmethod]
    fn from_binary(binary_data: Vec<u8>) -> PyResult<Self> {
        let (guide, _): (PyGuide, usize) =
            bincode::decode_from_slice(&binary_data[..], bincode::config::standard()).map_err(
                |e| {
                    PyErr::new::<PyValueError, _>(format!("Deserialization of Guide failed: {}", e))
                },
            )?;
        Ok(guide)
    }
}
