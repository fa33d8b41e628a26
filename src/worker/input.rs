//! Host scheduler input bag and its typed form

use serde_json::{Map, Value};
use thiserror::Error;

pub const ACCOUNT: &str = "ACCOUNT";
pub const UPLOAD_IDS: &str = "UPLOAD_IDS";
pub const CURRENT_BATCH_INDEX: &str = "CURRENT_BATCH_INDEX";
pub const TOTAL_UPLOAD_SIZE: &str = "TOTAL_UPLOAD_SIZE";

/// Opaque key/value bag the host scheduler hands to a job
pub type InputData = Map<String, Value>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Account name is missing or blank")]
    MissingAccount,

    #[error("Required key {0} is missing")]
    MissingKey(&'static str),

    #[error("Key {key} must be {expected}")]
    InvalidValue {
        key: &'static str,
        expected: &'static str,
    },

    #[error("Batch index {index} is out of range for {total} batches")]
    BatchIndexOutOfRange { index: u32, total: u32 },
}

pub type Result<T> = std::result::Result<T, InputError>;

/// Parameters of one worker invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInput {
    pub account_name: String,
    /// Processed in this order
    pub upload_ids: Vec<u64>,
    pub current_batch_index: u32,
    pub total_batches: u32,
}

impl BatchInput {
    pub fn new(account_name: impl Into<String>, upload_ids: Vec<u64>) -> Self {
        Self {
            account_name: account_name.into(),
            upload_ids,
            current_batch_index: 0,
            total_batches: 1,
        }
    }

    pub fn with_batch(mut self, index: u32, total: u32) -> Self {
        self.current_batch_index = index;
        self.total_batches = total;
        self
    }

    /// Check the account and batch position
    pub fn validate(&self) -> Result<()> {
        if self.account_name.trim().is_empty() {
            return Err(InputError::MissingAccount);
        }
        if self.total_batches > 0 && self.current_batch_index >= self.total_batches {
            return Err(InputError::BatchIndexOutOfRange {
                index: self.current_batch_index,
                total: self.total_batches,
            });
        }
        Ok(())
    }

    /// Parse and validate the host's input bag
    pub fn from_input(data: &InputData) -> Result<Self> {
        let account_name = match data.get(ACCOUNT) {
            None | Some(Value::Null) => return Err(InputError::MissingAccount),
            Some(Value::String(name)) => name.clone(),
            Some(_) => {
                return Err(InputError::InvalidValue {
                    key: ACCOUNT,
                    expected: "a string",
                });
            }
        };

        let upload_ids = match data.get(UPLOAD_IDS) {
            None => return Err(InputError::MissingKey(UPLOAD_IDS)),
            Some(Value::Array(values)) => values
                .iter()
                .map(|value| {
                    value.as_u64().ok_or(InputError::InvalidValue {
                        key: UPLOAD_IDS,
                        expected: "an array of unsigned integers",
                    })
                })
                .collect::<Result<Vec<u64>>>()?,
            Some(_) => {
                return Err(InputError::InvalidValue {
                    key: UPLOAD_IDS,
                    expected: "an array of unsigned integers",
                });
            }
        };

        let input = Self {
            account_name,
            upload_ids,
            current_batch_index: read_u32(data, CURRENT_BATCH_INDEX, 0)?,
            total_batches: read_u32(data, TOTAL_UPLOAD_SIZE, 1)?,
        };
        input.validate()?;
        Ok(input)
    }

    pub fn to_input_data(&self) -> InputData {
        let mut data = InputData::new();
        data.insert(ACCOUNT.into(), Value::from(self.account_name.clone()));
        data.insert(UPLOAD_IDS.into(), Value::from(self.upload_ids.clone()));
        data.insert(
            CURRENT_BATCH_INDEX.into(),
            Value::from(self.current_batch_index),
        );
        data.insert(TOTAL_UPLOAD_SIZE.into(), Value::from(self.total_batches));
        data
    }
}

fn read_u32(data: &InputData, key: &'static str, default: u32) -> Result<u32> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(InputError::InvalidValue {
                key,
                expected: "an unsigned 32-bit integer",
            }),
    }
}
