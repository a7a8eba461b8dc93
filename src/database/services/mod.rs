mod requests;
mod users;
