//! The parameter store.
//!
//! A tiny in-memory database for the handful of values the controller writes
//! through the fieldbus parameter channel. Writes come from the fieldbus
//! callback thread; the log writer snapshots the installation id whenever it
//! opens a file. Each field is swapped atomically as a whole, so a reader
//! sees either the previous or the new value, never a mix.

use arc_swap::ArcSwap;
use snafu::Snafu;
use std::sync::Arc;

/// Length of the controller-assigned installation identifier.
pub const INSTALLATION_ID_LENGTH: usize = 16;

/// Length of the datatype list parameter.
pub const DATATYPE_LIST_LENGTH: usize = 64;

/// Raw fieldbus index of the installation-id parameter.
pub const PARAM_IDX_INSTALLATION_ID: u32 = 123;

/// Raw fieldbus index of the datatype-list parameter.
pub const PARAM_IDX_DATATYPE_LIST: u32 = 124;

/// The parameters the store recognizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterIndex {
    InstallationId,
    DatatypeList,
}

impl ParameterIndex {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            PARAM_IDX_INSTALLATION_ID => Some(ParameterIndex::InstallationId),
            PARAM_IDX_DATATYPE_LIST => Some(ParameterIndex::DatatypeList),
            _ => None,
        }
    }

    pub const fn raw(self) -> u32 {
        match self {
            ParameterIndex::InstallationId => PARAM_IDX_INSTALLATION_ID,
            ParameterIndex::DatatypeList => PARAM_IDX_DATATYPE_LIST,
        }
    }

    /// The exact length a write to this parameter must have.
    pub const fn length(self) -> usize {
        match self {
            ParameterIndex::InstallationId => INSTALLATION_ID_LENGTH,
            ParameterIndex::DatatypeList => DATATYPE_LIST_LENGTH,
        }
    }
}

/// Error returned for rejected parameter operations.
#[derive(Debug, Snafu)]
pub enum ParameterError {
    #[snafu(display("unrecognized parameter index {index}"))]
    UnknownIndex { index: u32 },

    #[snafu(display(
        "parameter {index:?} expects {expected} bytes, write carried {actual}"
    ))]
    WrongLength {
        index: ParameterIndex,
        expected: usize,
        actual: usize,
    },
}

/// Process-wide store of controller-written parameters.
#[derive(Debug)]
pub struct ParameterStore {
    installation_id: ArcSwap<[u8; INSTALLATION_ID_LENGTH]>,
    datatype_list: ArcSwap<[u8; DATATYPE_LIST_LENGTH]>,
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self {
            installation_id: ArcSwap::from_pointee([0u8; INSTALLATION_ID_LENGTH]),
            datatype_list: ArcSwap::from_pointee([0u8; DATATYPE_LIST_LENGTH]),
        }
    }
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles a parameter write from the fieldbus callback.
    ///
    /// # Errors
    ///
    /// Fails if the index is not recognized or the payload length does not
    /// match the parameter; the stored value is untouched in either case.
    pub fn write_raw(&self, index: u32, bytes: &[u8]) -> Result<(), ParameterError> {
        let index = ParameterIndex::from_raw(index).ok_or(ParameterError::UnknownIndex { index })?;
        self.write(index, bytes)
    }

    /// Replaces one parameter wholesale.
    ///
    /// # Errors
    ///
    /// Fails if the payload length does not match the parameter.
    pub fn write(&self, index: ParameterIndex, bytes: &[u8]) -> Result<(), ParameterError> {
        if bytes.len() != index.length() {
            return Err(ParameterError::WrongLength {
                index,
                expected: index.length(),
                actual: bytes.len(),
            });
        }

        match index {
            ParameterIndex::InstallationId => {
                let mut value = [0u8; INSTALLATION_ID_LENGTH];
                value.copy_from_slice(bytes);
                self.installation_id.store(Arc::new(value));
            }
            ParameterIndex::DatatypeList => {
                let mut value = [0u8; DATATYPE_LIST_LENGTH];
                value.copy_from_slice(bytes);
                self.datatype_list.store(Arc::new(value));
            }
        }
        debug!(message = "Parameter written.", index = ?index);
        Ok(())
    }

    /// Returns a snapshot copy of one parameter, for controller read-back.
    pub fn read(&self, index: ParameterIndex) -> Box<[u8]> {
        match index {
            ParameterIndex::InstallationId => Box::new(*self.installation_id.load_full()),
            ParameterIndex::DatatypeList => Box::new(*self.datatype_list.load_full()),
        }
    }

    /// Snapshot of the installation id, taken at file-open time.
    pub fn installation_id(&self) -> [u8; INSTALLATION_ID_LENGTH] {
        **self.installation_id.load()
    }

    pub fn datatype_list(&self) -> [u8; DATATYPE_LIST_LENGTH] {
        **self.datatype_list.load()
    }
}
