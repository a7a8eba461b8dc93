mod request;
mod user;

pub use request::{AccessRequest, Decision, RequestStatus, RequestTicket};
pub use user::User;
