//! Named on-board functions which can be performed by telecommand.
use super::ErrorCode;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use core::fmt::{Debug, Formatter};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Width of the NUL padded function name field inside a perform function request.
pub const FUNCTION_NAME_LEN: usize = 32;
pub const DEFAULT_FUNCTION_CAPACITY: usize = 32;

/// A function receives the raw argument bytes of the request. An error code returned by the
/// function is reported as a completion failure.
pub type Function = Box<dyn FnMut(&[u8]) -> Result<(), ErrorCode> + Send>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FunctionError {
    #[error("unknown function {0}")]
    UnknownFunction(String),
    #[error("function name longer than 32 bytes")]
    NameTooLong,
    #[error("function name is not valid UTF-8")]
    InvalidName,
    #[error("function {0} already registered")]
    AlreadyRegistered(String),
    #[error("function pool full")]
    PoolFull,
    #[error("function failed with {0:?}")]
    Failed(ErrorCode),
}

impl FunctionError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            FunctionError::UnknownFunction(_) => ErrorCode::UnknownFunction,
            FunctionError::NameTooLong | FunctionError::InvalidName => ErrorCode::InvalidParameters,
            FunctionError::AlreadyRegistered(_) => ErrorCode::InvalidParameters,
            FunctionError::PoolFull => ErrorCode::TableFull,
            FunctionError::Failed(code) => *code,
        }
    }
}

/// Extract a function name from a NUL padded name field.
pub fn name_from_padded(field: &[u8]) -> Result<&str, FunctionError> {
    if field.len() > FUNCTION_NAME_LEN {
        return Err(FunctionError::NameTooLong);
    }
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    core::str::from_utf8(&field[..end]).map_err(|_| FunctionError::InvalidName)
}

pub struct FunctionPool {
    functions: BTreeMap<String, Function>,
    capacity: usize,
}

impl Default for FunctionPool {
    fn default() -> Self {
        Self::new(DEFAULT_FUNCTION_CAPACITY)
    }
}

impl Debug for FunctionPool {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FunctionPool")
            .field("functions", &self.functions.keys())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl FunctionPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            functions: BTreeMap::new(),
            capacity,
        }
    }

    pub fn register(
        &mut self,
        name: &str,
        function: impl FnMut(&[u8]) -> Result<(), ErrorCode> + Send + 'static,
    ) -> Result<(), FunctionError> {
        if name.len() > FUNCTION_NAME_LEN {
            return Err(FunctionError::NameTooLong);
        }
        if self.functions.contains_key(name) {
            return Err(FunctionError::AlreadyRegistered(name.to_string()));
        }
        if self.functions.len() >= self.capacity {
            warn!(name, "function pool full");
            return Err(FunctionError::PoolFull);
        }
        debug!(name, "registering function");
        self.functions.insert(name.to_string(), Box::new(function));
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.functions.remove(name).is_some()
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn call(&mut self, name: &str, args: &[u8]) -> Result<(), FunctionError> {
        let function = self
            .functions
            .get_mut(name)
            .ok_or_else(|| FunctionError::UnknownFunction(name.to_string()))?;
        debug!(name, args_len = args.len(), "performing function");
        function(args).map_err(FunctionError::Failed)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use alloc::vec::Vec;
    use std::sync::Mutex;

    #[test]
    fn test_call_passes_arguments() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let mut pool = FunctionPool::default();
        pool.register("heater_on", move |args| {
            sink.lock().unwrap().extend_from_slice(args);
            Ok(())
        })
        .unwrap();
        pool.call("heater_on", &[1, 2, 3]).unwrap();
        assert_eq!(*received.lock().unwrap(), [1, 2, 3]);
    }

    #[test]
    fn test_unknown_function() {
        let mut pool = FunctionPool::default();
        let err = pool.call("missing", &[]).unwrap_err();
        assert_eq!(err, FunctionError::UnknownFunction("missing".into()));
        assert_eq!(err.error_code(), ErrorCode::UnknownFunction);
    }

    #[test]
    fn test_failing_function() {
        let mut pool = FunctionPool::default();
        pool.register("fail", |_| Err(ErrorCode::ExecutionFailed))
            .unwrap();
        let err = pool.call("fail", &[]).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ExecutionFailed);
    }

    #[test]
    fn test_register_limits() {
        let mut pool = FunctionPool::new(1);
        pool.register("a", |_| Ok(())).unwrap();
        assert_eq!(
            pool.register("a", |_| Ok(())).unwrap_err(),
            FunctionError::AlreadyRegistered("a".into())
        );
        assert_eq!(
            pool.register("b", |_| Ok(())).unwrap_err(),
            FunctionError::PoolFull
        );
        let long = "x".repeat(FUNCTION_NAME_LEN + 1);
        assert_eq!(
            FunctionPool::default()
                .register(&long, |_| Ok(()))
                .unwrap_err(),
            FunctionError::NameTooLong
        );
    }

    #[test]
    fn test_padded_name() {
        let mut field = [0u8; FUNCTION_NAME_LEN];
        field[..4].copy_from_slice(b"ping");
        assert_eq!(name_from_padded(&field).unwrap(), "ping");
        assert_eq!(name_from_padded(b"full").unwrap(), "full");
        assert_eq!(
            name_from_padded(&[0xff, 0xfe]).unwrap_err(),
            FunctionError::InvalidName
        );
    }
}
