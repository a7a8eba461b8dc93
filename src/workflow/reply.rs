/// Keyboard attached to an outgoing message. The transport layer maps these
/// to the concrete chat-platform markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    None,
    UserMenu,
    PhoneRequest,
    AdminDecision(i64),
    AdminPanel,
}

/// Transport-neutral outcome of a workflow event. Handlers return an ordered
/// list of these; the chat layer renders them in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Message to the chat the event came from.
    Message { text: String, keyboard: Keyboard },
    /// Message to another user (e.g. the requester, after a decision).
    /// Delivery failures are swallowed by the transport.
    Direct {
        user_id: i64,
        text: String,
        keyboard: Keyboard,
    },
    /// Fan-out to every administrator, best effort per recipient. A request
    /// id attaches the approve/reject keyboard to each copy.
    AdminBroadcast {
        text: String,
        request_id: Option<i64>,
    },
    /// Acknowledge the originating button press.
    Ack { text: Option<String> },
    /// Acknowledge with an alert popup (admin-facing transient errors).
    AckAlert { text: String },
    /// Append the decision outcome to the admin's decision message,
    /// dropping its keyboard.
    EditDecision { note: String },
}

impl Reply {
    pub fn message(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self::Message {
            text: text.into(),
            keyboard,
        }
    }
}
