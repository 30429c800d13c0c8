pub mod app;
pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod http_handler;
pub mod middleware;
pub mod options;
pub mod presence;
pub mod protocol;
pub mod server;
pub mod store;
pub mod sync;
pub mod token;
pub mod utils;
pub mod ws_handler;
