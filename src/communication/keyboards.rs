use teloxide::types::{
    ButtonRequest, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
};

pub fn user_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback("🚚 Current loads", "loads")],
        vec![InlineKeyboardButton::callback("📌 Access status", "status")],
        vec![InlineKeyboardButton::callback(
            "📞 Change phone number",
            "change_phone",
        )],
    ])
}

pub fn phone_request() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new("📲 Send my number").request(ButtonRequest::Contact)
    ]])
    .resize_keyboard(true)
    .one_time_keyboard(true)
}

pub fn admin_decision(request_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("✅ Confirm payment", format!("approve:{request_id}")),
        InlineKeyboardButton::callback("❌ Reject", format!("reject:{request_id}")),
    ]])
}

pub fn admin_panel() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "📋 Show pending",
        "admin:pending",
    )]])
}
