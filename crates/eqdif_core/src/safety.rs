use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// Runs `f`, turning both a returned error and a panic into a logged `None`.
///
/// Used around every call made on behalf of the launcher so that a failing
/// step cannot take the background thread down with it.
pub fn with_safety_net<R>(label: &str, f: impl FnOnce() -> anyhow::Result<R>) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            error!("Caught error in {}: {:#}", label, err);
            None
        }
        Err(payload) => {
            error!("Caught panic in {}: {}", label, panic_payload_to_string(payload));
            None
        }
    }
}

fn panic_payload_to_string(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    "unknown panic payload".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_values_through() {
        assert_eq!(with_safety_net("ok", || Ok(3)), Some(3));
    }

    #[test]
    fn swallows_errors_and_panics() {
        assert_eq!(
            with_safety_net::<()>("err", || Err(anyhow::anyhow!("boom"))),
            None
        );
        assert_eq!(with_safety_net::<()>("panic", || panic!("boom")), None);
        assert_eq!(
            with_safety_net::<()>("panic", || panic!("{} {}", "formatted", 1)),
            None
        );
    }

    #[test]
    fn payload_messages() {
        assert_eq!(panic_payload_to_string(Box::new("static")), "static");
        assert_eq!(panic_payload_to_string(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_payload_to_string(Box::new(7u8)), "unknown panic payload");
    }
}
