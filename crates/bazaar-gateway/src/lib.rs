pub mod connection;
pub mod dispatcher;

pub use connection::{GatewayState, router};
pub use dispatcher::{Dispatcher, RoomFanout};
