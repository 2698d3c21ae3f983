pub mod events_ws_handler;
pub mod health;
pub mod lobby_handler;
