use crate::workflow::{Keyboard, Reply, WorkflowError};

/// Map a workflow error onto the reply the event's author should see.
/// Admin-facing conditions become alert acks; user-correctable input gets a
/// re-prompt; internal errors get a generic apology.
pub fn reply_for_error(error: &WorkflowError) -> Reply {
    match error {
        WorkflowError::InvalidPhoneFormat(_) => Reply::message(
            "Wrong format. Example: +998901234567",
            Keyboard::None,
        ),
        WorkflowError::RequestNotFound(_) => Reply::AckAlert {
            text: "Request not found".to_string(),
        },
        WorkflowError::RequestAlreadyDecided(_) => Reply::AckAlert {
            text: "Already decided".to_string(),
        },
        WorkflowError::Unauthorized(_) => Reply::AckAlert {
            text: "No access".to_string(),
        },
        WorkflowError::Ledger(_) => Reply::message(
            "Could not service request - please try again later",
            Keyboard::None,
        ),
    }
}
