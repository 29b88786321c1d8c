//! Service 8: function management.
use super::{ExecutionFailure, Outbox, PusContext, PusService};
use crate::ecss::function::{name_from_padded, FUNCTION_NAME_LEN};
use crate::ecss::{ErrorCode, PusServiceId};
use crate::message::Message;
use crate::PacketType;
use alloc::string::ToString;

pub const MSG_TYPE_PERFORM_FUNCTION: u8 = 1;

/// Performs functions of the [FunctionPool](crate::ecss::function::FunctionPool). The
/// application data starts with the NUL padded function name, everything after it is passed to
/// the function as argument bytes.
#[derive(Debug, Default)]
pub struct FunctionService;

impl PusService for FunctionService {
    fn service_type(&self) -> u8 {
        PusServiceId::FunctionManagement as u8
    }

    fn message_types(&self) -> &'static [u8] {
        &[MSG_TYPE_PERFORM_FUNCTION]
    }

    fn handle(
        &mut self,
        tc: &mut Message,
        ctx: &mut PusContext,
        _out: &mut Outbox,
    ) -> Result<(), ExecutionFailure> {
        if !tc.assert_type(PacketType::Tc, self.service_type(), MSG_TYPE_PERFORM_FUNCTION) {
            return Err(ExecutionFailure::Start(ErrorCode::IllegalMessageType));
        }
        let name = name_from_padded(tc.read_fixed_string(FUNCTION_NAME_LEN)?)?.to_string();
        let args = tc.remaining_bytes();
        ctx.functions.call(&name, args)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecss::verification::VerificationOutcome;
    use crate::services::tests::{dispatcher, tc, types};
    use alloc::sync::Arc;
    use alloc::vec;
    use alloc::vec::Vec;
    use std::sync::Mutex;

    fn request(name: &str, args: &[u8]) -> Vec<u8> {
        let mut app_data = vec![0; FUNCTION_NAME_LEN];
        app_data[..name.len()].copy_from_slice(name.as_bytes());
        app_data.extend_from_slice(args);
        tc(8, 1, &app_data)
    }

    #[test]
    fn test_perform_function() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let mut ctx = PusContext::default();
        ctx.functions
            .register("reboot", move |args| {
                sink.lock().unwrap().push(args.to_vec());
                Ok(())
            })
            .unwrap();
        let mut dispatcher = dispatcher();
        let output = dispatcher.dispatch(&request("reboot", &[7, 8]), &mut ctx);
        assert_eq!(types(&output), vec![(1, 1), (1, 3), (1, 7)]);
        assert_eq!(*calls.lock().unwrap(), vec![vec![7, 8]]);
    }

    #[test]
    fn test_unknown_function() {
        let mut ctx = PusContext::default();
        let output = dispatcher().dispatch(&request("missing", &[]), &mut ctx);
        assert_eq!(
            output.notices.last().unwrap().outcome,
            VerificationOutcome::StartFailure(ErrorCode::UnknownFunction)
        );
    }

    #[test]
    fn test_function_failure_fails_completion() {
        let mut ctx = PusContext::default();
        ctx.functions
            .register("deploy", |_| Err(ErrorCode::ExecutionFailed))
            .unwrap();
        let output = dispatcher().dispatch(&request("deploy", &[]), &mut ctx);
        assert_eq!(types(&output), vec![(1, 1), (1, 3), (1, 8)]);
    }

    #[test]
    fn test_short_name_field() {
        let mut ctx = PusContext::default();
        let output = dispatcher().dispatch(&tc(8, 1, b"ping"), &mut ctx);
        assert_eq!(
            output.notices.last().unwrap().outcome,
            VerificationOutcome::StartFailure(ErrorCode::InvalidLength)
        );
    }
}
