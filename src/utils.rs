use crate::types::PanicPayload;

pub(crate) fn panic_message(payload: &PanicPayload) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "work unit panicked".to_owned()
    }
}
